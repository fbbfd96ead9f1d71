//! Query/URL resolution into downloaded audio files.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use super::{MediaHandle, ResolvedMedia, TrackDuration};
use crate::error::ErrorCode;
use crate::utils::{is_http_url, parse_clock};

/// Errors that can occur while resolving media.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Nothing matched the query.
    #[error("no media found for '{0}'")]
    NotFound(String),

    /// Network failure while talking to the media source.
    #[error("network error: {0}")]
    Network(String),

    /// The source is not something the resolver can handle.
    #[error("unsupported source: {0}")]
    Unsupported(String),

    /// Local process or filesystem failure.
    #[error("resolver I/O error: {0}")]
    Io(String),
}

impl ResolutionError {
    /// Returns true if a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl ErrorCode for ResolutionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "media_not_found",
            Self::Network(_) => "media_network_error",
            Self::Unsupported(_) => "media_unsupported",
            Self::Io(_) => "media_io_error",
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolutionError>;

/// Resolves a search query or URL into a locally playable file plus metadata.
///
/// Implementations may block on the network for a long time; callers must not
/// hold a channel lock across `resolve`.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> ResolveResult<ResolvedMedia>;
}

/// Subset of the `yt-dlp --dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    duration_string: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<YtDlpInfo>>,
}

/// [`MediaResolver`] backed by the `yt-dlp` executable.
///
/// Downloads the best audio stream, extracts it to mp3 and stores it as
/// `<download_dir>/<id>.mp3`.
pub struct YtDlpResolver {
    binary: String,
    download_dir: PathBuf,
}

impl YtDlpResolver {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            download_dir: download_dir.into(),
        }
    }

    /// Overrides the executable name or path.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn target_for(query: &str) -> String {
        let query = query.trim();
        if is_http_url(query) {
            query.to_string()
        } else {
            format!("ytsearch:{query}")
        }
    }

    fn output_template(&self) -> String {
        self.download_dir
            .join("%(id)s.%(ext)s")
            .to_string_lossy()
            .into_owned()
    }

    /// Maps parsed yt-dlp output to [`ResolvedMedia`], taking the first search entry if present.
    fn build_resolved(&self, query: &str, info: YtDlpInfo) -> ResolveResult<ResolvedMedia> {
        let info = match info.entries {
            Some(entries) => entries
                .into_iter()
                .next()
                .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?,
            None => info,
        };

        let id = info
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ResolutionError::Unsupported(format!("no id in output for '{query}'")))?;

        let duration = info
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64)
            .or_else(|| info.duration_string.as_deref().and_then(parse_clock));

        Ok(ResolvedMedia {
            media: MediaHandle::File(self.download_dir.join(format!("{id}.mp3"))),
            title: info.title.unwrap_or_default(),
            uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
            duration: TrackDuration::from_secs(duration),
            source_url: info.webpage_url,
            thumbnail: info.thumbnail,
            id,
        })
    }
}

/// Classifies a failed yt-dlp run from its stderr.
fn classify_failure(query: &str, stderr: &str) -> ResolutionError {
    let lower = stderr.to_ascii_lowercase();
    if ["timed out", "timeout", "network", "connection", "temporary failure", "http error 5"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        ResolutionError::Network(first_line(stderr))
    } else if lower.contains("unsupported url") {
        ResolutionError::Unsupported(query.to_string())
    } else {
        ResolutionError::NotFound(query.to_string())
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string()
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> ResolveResult<ResolvedMedia> {
        let target = Self::target_for(query);
        log::info!("[YtDlpResolver] Resolving {}", target);

        let output = Command::new(&self.binary)
            .arg("--dump-single-json")
            .arg("--no-simulate")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--quiet")
            .arg("--restrict-filenames")
            .args(["-f", "bestaudio/best"])
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "192K"])
            .arg("-o")
            .arg(self.output_template())
            .arg(&target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolutionError::Io(format!("failed to spawn {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!(
                "[YtDlpResolver] {} exited with {}: {}",
                self.binary,
                output.status,
                first_line(&stderr)
            );
            return Err(classify_failure(query, &stderr));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolutionError::Unsupported(format!("unreadable resolver output: {e}")))?;

        let resolved = self.build_resolved(query, info)?;
        log::info!(
            "[YtDlpResolver] Resolved '{}' -> {} ({})",
            query,
            resolved.media,
            resolved.duration
        );
        Ok(resolved)
    }
}
