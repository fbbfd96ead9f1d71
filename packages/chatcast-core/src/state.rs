//! Core configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the playback core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Queue
    /// Maximum number of pending (not yet playing) requests per channel.
    pub max_queue_size: usize,

    /// Longest accepted track in minutes (0 = unlimited).
    pub duration_limit_minutes: u64,

    // Media
    /// Directory downloaded files are written to.
    pub download_dir: PathBuf,

    /// Backoff delays for retrying a transient first-attempt resolution (milliseconds).
    pub resolve_retry_delays_ms: Vec<u64>,

    // Command surface
    /// Prefix that marks a chat message as a command.
    pub command_prefix: String,

    /// Number of queue entries per page in the queue listing.
    pub queue_page_size: usize,

    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Capacity of the event broadcast and transport event channels.
    pub event_channel_capacity: usize,

    // Simulated transport
    /// Play time the simulated transport gives tracks of unknown length (seconds).
    pub simulated_unknown_duration_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_queue_size: 10,
            duration_limit_minutes: 120,
            download_dir: PathBuf::from("downloads/"),
            resolve_retry_delays_ms: vec![500, 1000, 2000],
            command_prefix: "!".to_string(),
            queue_page_size: 5,
            preferred_port: 0,
            event_channel_capacity: 100,
            simulated_unknown_duration_secs: 30,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be >= 1".to_string());
        }
        if self.queue_page_size == 0 {
            return Err("queue_page_size must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.command_prefix.trim().is_empty() {
            return Err("command_prefix must not be empty".to_string());
        }
        Ok(())
    }

    /// Returns the duration limit in seconds, if one is configured.
    #[must_use]
    pub fn duration_limit_secs(&self) -> Option<u64> {
        (self.duration_limit_minutes > 0).then(|| self.duration_limit_minutes * 60)
    }
}
