//! Live audio session transport.
//!
//! The transport joins a channel's live session, streams one media handle at a
//! time and reports when that stream ends. Stream-end notifications travel on
//! an `mpsc` channel handed to the transport at construction and are consumed by
//! [`StreamEndProcessor`](crate::services::StreamEndProcessor).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;
use crate::media::{MediaHandle, TrackDuration};
use crate::types::ChannelId;

pub mod simulated;

pub use simulated::SimulatedTransport;

/// Errors reported by a streaming transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel has no live session to join.
    #[error("no active live session in channel {0}")]
    NoActiveSession(ChannelId),

    /// The transport refused the operation.
    #[error("transport rejected request: {0}")]
    Rejected(String),

    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoActiveSession(_) => "no_active_session",
            Self::Rejected(_) => "transport_rejected",
            Self::Io(_) => "transport_io_error",
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Parameters for starting a stream.
#[derive(Debug, Clone)]
pub struct StreamStart {
    pub media: MediaHandle,
    pub duration: TrackDuration,
    /// Identity token echoed back in [`TransportEvent::StreamEnded`].
    pub generation: u64,
}

/// Asynchronous notifications from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    /// The stream started with `generation` finished or was aborted by the platform.
    StreamEnded { channel: ChannelId, generation: u64 },
}

impl TransportEvent {
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::StreamEnded { channel, .. } => *channel,
        }
    }
}

/// Controls a channel's live audio session.
///
/// Used by `PlaybackController`; every call is made while the channel's lock
/// is held, so implementations only need to be quick, not reentrant.
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    /// Joins the channel's live session (if not already joined) and starts
    /// streaming `stream.media`, replacing whatever was playing.
    ///
    /// A replaced stream must not produce a `StreamEnded` event.
    async fn join_and_play(&self, channel: ChannelId, stream: StreamStart) -> TransportResult<()>;

    /// Leaves the channel's live session. Leaving a channel that was never
    /// joined succeeds.
    async fn leave(&self, channel: ChannelId) -> TransportResult<()>;

    /// Pauses the active stream.
    async fn pause(&self, channel: ChannelId) -> TransportResult<()>;

    /// Resumes a paused stream.
    async fn resume(&self, channel: ChannelId) -> TransportResult<()>;
}
