//! Event emitter abstraction for decoupling the controller from delivery.

use super::{PlaybackEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// The playback controller emits through this trait; how events reach clients
/// (WebSocket broadcast, logs, nothing) is decided at bootstrap.
pub trait EventEmitter: Send + Sync {
    /// Emits a queue/playback event.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a live-session event.
    fn emit_session(&self, event: SessionEvent);
}

/// Discards every event.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_playback(&self, _event: PlaybackEvent) {}

    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(channel = %event.channel(), ?event, "playback_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}
