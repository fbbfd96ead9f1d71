//! Media resolution, duration probing and downloaded-file lifecycle.
//!
//! - [`resolver`]: turns a search query or URL into a playable local file
//! - [`probe`]: asks a remote stream for its duration
//! - [`janitor`]: reference-counted deletion of downloaded files
//! - [`retry`]: bounded backoff for transient resolution failures

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::format_clock;

pub mod janitor;
pub mod probe;
pub mod resolver;
pub(crate) mod retry;

pub use janitor::MediaJanitor;
pub use probe::{DurationProbe, FfprobeDurationProbe};
pub use resolver::{MediaResolver, ResolutionError, ResolveResult, YtDlpResolver};

/// Length of a track.
///
/// Streams whose length cannot be determined are `Unknown`; they are never
/// represented as zero seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "camelCase")]
pub enum TrackDuration {
    /// Length in whole seconds.
    Known(u64),
    /// Length could not be resolved (live stream, failed probe).
    Unknown,
}

impl TrackDuration {
    /// Builds a duration from an optional seconds value.
    #[must_use]
    pub fn from_secs(secs: Option<u64>) -> Self {
        secs.map_or(Self::Unknown, Self::Known)
    }

    /// Returns the length in seconds, if known.
    #[must_use]
    pub fn as_secs(&self) -> Option<u64> {
        match self {
            Self::Known(secs) => Some(*secs),
            Self::Unknown => None,
        }
    }

    /// Returns true if the length is unknown.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for TrackDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(secs) => f.write_str(&format_clock(*secs)),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Reference to something the streaming transport can play.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "location", rename_all = "camelCase")]
pub enum MediaHandle {
    /// A downloaded file owned by this process. Deleted once no request needs it.
    File(PathBuf),
    /// A remote URL streamed directly. Never deleted.
    Remote(String),
}

impl MediaHandle {
    /// Returns the local path for file handles.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Remote(_) => None,
        }
    }

    /// Returns true if the handle is available to play.
    ///
    /// Remote handles are always considered present; file handles must exist on disk.
    pub async fn is_present(&self) -> bool {
        match self {
            Self::File(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Self::Remote(_) => true,
        }
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Result of resolving a query into playable media.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMedia {
    /// Resolver-assigned identifier (also the downloaded file stem).
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration: TrackDuration,
    pub media: MediaHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_duration_never_renders_as_zero() {
        assert_eq!(TrackDuration::Unknown.to_string(), "Unknown");
        assert_eq!(TrackDuration::Known(0).to_string(), "00:00");
        assert_eq!(TrackDuration::Known(180).to_string(), "03:00");
    }

    #[test]
    fn duration_from_optional_seconds() {
        assert_eq!(TrackDuration::from_secs(Some(5)), TrackDuration::Known(5));
        assert_eq!(TrackDuration::from_secs(None), TrackDuration::Unknown);
        assert_eq!(TrackDuration::Known(5).as_secs(), Some(5));
        assert!(TrackDuration::Unknown.is_unknown());
    }

    #[test]
    fn duration_serializes_as_tagged_value() {
        let json = serde_json::to_value(TrackDuration::Known(42)).unwrap();
        assert_eq!(json["kind"], "known");
        assert_eq!(json["seconds"], 42);

        let json = serde_json::to_value(TrackDuration::Unknown).unwrap();
        assert_eq!(json["kind"], "unknown");
    }

    #[tokio::test]
    async fn file_handle_presence_follows_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.mp3");
        let handle = MediaHandle::File(path.clone());
        assert!(!handle.is_present().await);

        std::fs::write(&path, b"id3").unwrap();
        assert!(handle.is_present().await);
    }

    #[tokio::test]
    async fn remote_handle_is_always_present() {
        let handle = MediaHandle::Remote("https://radio.example/live".into());
        assert!(handle.is_present().await);
        assert!(handle.path().is_none());
    }
}
