//! Chatcast Server - headless host for per-chat audio queues.
//!
//! Runs the playback core behind the HTTP/WebSocket API. Chat front-ends post
//! commands and button callbacks; live session transports report stream ends.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chatcast_core::{bootstrap_services, start_server, AppState};
use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;

use crate::config::ServerConfig;

/// Chatcast Server - per-chat music queues for live group audio.
#[derive(Parser, Debug)]
#[command(name = "chatcast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CHATCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "CHATCAST_BIND_PORT")]
    port: Option<u16>,

    /// Download directory (overrides config file).
    #[arg(short = 'd', long, env = "CHATCAST_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Chatcast Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(download_dir) = args.download_dir {
        config.download_dir = download_dir;
    }

    log::info!(
        "Configuration: bind_port={}, download_dir={}, max_queue_size={}, prefix={:?}",
        config.bind_port,
        config.download_dir.display(),
        config.max_queue_size,
        config.command_prefix
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    services.start_background_tasks();
    log::info!("Background tasks started");

    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));
    let shutdown = services.cancel_token.clone();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Cancels the server's graceful shutdown along with the background tasks.
    services.shutdown().await;

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
