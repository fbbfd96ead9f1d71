//! Application bootstrap and dependency wiring.
//!
//! This is the composition root: every service is created and wired here, so
//! the dependency graph is visible in one place and tests can swap the
//! transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatcastError, ChatcastResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::media::{DurationProbe, FfprobeDurationProbe, MediaJanitor, MediaResolver, YtDlpResolver};
use crate::runtime::TokioSpawner;
use crate::services::{ControllerSettings, PlaybackController, QueueStore, StreamEndProcessor};
use crate::state::Config;
use crate::surface::CommandSurface;
use crate::transport::{SimulatedTransport, StreamingTransport, TransportEvent};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Owns every playback transition.
    pub controller: Arc<PlaybackController>,
    /// Chat command handling on top of the controller.
    pub surface: Arc<CommandSurface>,
    /// Per-channel queue state.
    pub queue_store: Arc<QueueStore>,
    /// Downloaded-file lifecycle.
    pub janitor: Arc<MediaJanitor>,
    /// Live session transport.
    pub transport: Arc<dyn StreamingTransport>,
    /// Event bridge feeding WebSocket clients.
    pub event_bridge: Arc<BroadcastEventBridge>,
    stream_end_processor: Arc<StreamEndProcessor>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the stream-end pump.
    pub fn start_background_tasks(&self) {
        self.stream_end_processor
            .start(self.cancel_token.child_token());
    }

    /// Stops background tasks, then stops every channel (leaving its session
    /// and deleting its files).
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let channels = self.queue_store.len();
        self.controller.shutdown().await;
        log::info!("[Bootstrap] Stopped {} channel(s)", channels);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services with the in-process simulated transport.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the download directory
/// cannot be created.
pub fn bootstrap_services(config: &Config) -> ChatcastResult<BootstrappedServices> {
    let unknown = Duration::from_secs(config.simulated_unknown_duration_secs);
    bootstrap_services_with_transport(config, move |event_tx, spawner| {
        Arc::new(SimulatedTransport::new(event_tx, unknown, spawner))
    })
}

/// Bootstraps all services around a caller-supplied transport.
///
/// `make_transport` receives the sender it must report [`TransportEvent`]s on.
///
/// Wiring order:
/// 1. Shared infrastructure (spawner, event channel, cancellation token)
/// 2. Media collaborators (resolver, probe, janitor)
/// 3. Transport
/// 4. Event bridge
/// 5. Playback controller, command surface and stream-end processor
pub fn bootstrap_services_with_transport<F>(
    config: &Config,
    make_transport: F,
) -> ChatcastResult<BootstrappedServices>
where
    F: FnOnce(mpsc::Sender<TransportEvent>, TokioSpawner) -> Arc<dyn StreamingTransport>,
{
    config.validate().map_err(ChatcastError::Configuration)?;

    std::fs::create_dir_all(&config.download_dir).map_err(|e| {
        ChatcastError::Configuration(format!(
            "cannot create download directory {}: {}",
            config.download_dir.display(),
            e
        ))
    })?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);

    let resolver: Arc<dyn MediaResolver> = Arc::new(YtDlpResolver::new(&config.download_dir));
    let probe: Arc<dyn DurationProbe> = Arc::new(FfprobeDurationProbe::new());
    let janitor = Arc::new(MediaJanitor::new());

    let transport = make_transport(event_tx, spawner.clone());

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let queue_store = Arc::new(QueueStore::new());
    let controller = Arc::new(PlaybackController::new(
        Arc::clone(&queue_store),
        Arc::clone(&transport),
        resolver,
        probe,
        Arc::clone(&janitor),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        ControllerSettings::from_config(config),
    ));

    let surface = Arc::new(CommandSurface::new(
        Arc::clone(&controller),
        config.command_prefix.clone(),
        config.queue_page_size,
    ));

    let stream_end_processor = Arc::new(StreamEndProcessor::new(
        Arc::clone(&controller),
        event_rx,
        spawner.clone(),
    ));

    log::info!(
        "[Bootstrap] Services ready (downloads in {}, queue limit {})",
        config.download_dir.display(),
        config.max_queue_size
    );

    Ok(BootstrappedServices {
        controller,
        surface,
        queue_store,
        janitor,
        transport,
        event_bridge,
        stream_end_processor,
        spawner,
        cancel_token,
    })
}
