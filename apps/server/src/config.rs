//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in the default range).
    /// Override: `CHATCAST_BIND_PORT`
    pub bind_port: u16,

    /// Directory downloaded audio is written to.
    /// Override: `CHATCAST_DOWNLOAD_DIR`
    pub download_dir: PathBuf,

    /// Maximum pending requests per chat.
    /// Override: `CHATCAST_MAX_QUEUE_SIZE`
    pub max_queue_size: usize,

    /// Longest accepted track in minutes (0 = unlimited).
    /// Override: `CHATCAST_DURATION_LIMIT`
    pub duration_limit_minutes: u64,

    /// Prefix that marks chat text as a command.
    /// Override: `CHATCAST_PREFIX`
    pub command_prefix: String,

    /// Entries per page in the queue listing.
    pub queue_page_size: usize,

    /// Backoff for transient resolution failures (milliseconds).
    pub resolve_retry_delays_ms: Vec<u64>,

    /// Play time the simulated transport gives streams of unknown length (seconds).
    pub simulated_unknown_duration_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = chatcast_core::Config::default();
        Self {
            bind_port: 0,
            download_dir: core.download_dir,
            max_queue_size: core.max_queue_size,
            duration_limit_minutes: core.duration_limit_minutes,
            command_prefix: core.command_prefix,
            queue_page_size: core.queue_page_size,
            resolve_retry_delays_ms: core.resolve_retry_delays_ms,
            simulated_unknown_duration_secs: core.simulated_unknown_duration_secs,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse("CHATCAST_BIND_PORT") {
            self.bind_port = port;
        }
        if let Some(size) = env_parse("CHATCAST_MAX_QUEUE_SIZE") {
            self.max_queue_size = size;
        }
        if let Some(limit) = env_parse("CHATCAST_DURATION_LIMIT") {
            self.duration_limit_minutes = limit;
        }
        if let Ok(prefix) = std::env::var("CHATCAST_PREFIX") {
            if !prefix.is_empty() {
                self.command_prefix = prefix;
            }
        }

        // Note: CHATCAST_DOWNLOAD_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to chatcast-core's Config type.
    pub fn to_core_config(&self) -> chatcast_core::Config {
        chatcast_core::Config {
            preferred_port: self.bind_port,
            download_dir: self.download_dir.clone(),
            max_queue_size: self.max_queue_size,
            duration_limit_minutes: self.duration_limit_minutes,
            command_prefix: self.command_prefix.clone(),
            queue_page_size: self.queue_page_size,
            resolve_retry_delays_ms: self.resolve_retry_delays_ms.clone(),
            simulated_unknown_duration_secs: self.simulated_unknown_duration_secs,
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
