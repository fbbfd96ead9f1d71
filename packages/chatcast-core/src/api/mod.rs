//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to the playback services, plus router
//! construction and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::events::BroadcastEventBridge;
use crate::services::PlaybackController;
use crate::state::Config;
use crate::surface::CommandSurface;

pub mod http;
pub mod response;
pub mod ws;

/// Ports tried when no preferred port is configured.
const PORT_RANGE: (u16, u16) = (49500, 49510);

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PlaybackController>,
    pub surface: Arc<CommandSurface>,
    /// Source of the WebSocket event feed.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self {
            controller: Arc::clone(&services.controller),
            surface: Arc::clone(&services.surface),
            event_bridge: Arc::clone(&services.event_bridge),
            config,
        }
    }
}

/// Binds the first free port in `start..=end`.
pub async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port and runs
/// it until `shutdown` is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(PORT_RANGE.0, PORT_RANGE.1).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
