//! Duration probing for remote streams.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Default time allowed for a single probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Asks a remote stream for its length.
///
/// `None` means the length could not be determined; callers record it as
/// [`TrackDuration::Unknown`](super::TrackDuration::Unknown).
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Option<u64>;
}

/// [`DurationProbe`] backed by `ffprobe`.
pub struct FfprobeDurationProbe {
    binary: String,
    timeout: Duration,
}

impl Default for FfprobeDurationProbe {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl FfprobeDurationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Parses ffprobe's bare `format=duration` output.
///
/// Live streams report `N/A`.
fn parse_probe_output(stdout: &str) -> Option<u64> {
    let secs: f64 = stdout.trim().parse().ok()?;
    (secs.is_finite() && secs > 0.0).then(|| secs.round() as u64)
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe(&self, url: &str) -> Option<u64> {
        let run = Command::new(&self.binary)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                log::warn!("[DurationProbe] Failed to run {}: {}", self.binary, e);
                return None;
            }
            Err(_) => {
                log::warn!("[DurationProbe] Probe of {} timed out after {:?}", url, self.timeout);
                return None;
            }
        };

        if !output.status.success() {
            log::debug!("[DurationProbe] {} exited with {}", self.binary, output.status);
            return None;
        }

        let secs = parse_probe_output(&String::from_utf8_lossy(&output.stdout));
        log::debug!("[DurationProbe] {} -> {:?}", url, secs);
        secs
    }
}
