//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the playback controller to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for queue/playback changes and live-session changes

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::types::{ChannelId, Request, RequestId};

/// Events broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Queue and playback changes.
    Playback(PlaybackEvent),

    /// Live-session join/leave.
    Session(SessionEvent),
}

/// Events related to a channel's queue and playback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// A request was admitted to the pending queue.
    #[serde(rename_all = "camelCase")]
    Queued {
        channel: ChannelId,
        request: Request,
        /// 1-based position in the pending queue.
        position: usize,
        timestamp: u64,
    },
    /// A request started streaming.
    #[serde(rename_all = "camelCase")]
    Started {
        channel: ChannelId,
        request: Request,
        generation: u64,
        timestamp: u64,
    },
    /// The current track ended on its own.
    #[serde(rename_all = "camelCase")]
    Finished {
        channel: ChannelId,
        request_id: RequestId,
        title: String,
        timestamp: u64,
    },
    /// The current track was skipped by a user.
    #[serde(rename_all = "camelCase")]
    Skipped {
        channel: ChannelId,
        request_id: RequestId,
        title: String,
        timestamp: u64,
    },
    /// A request failed to resolve or play and was discarded.
    #[serde(rename_all = "camelCase")]
    Dropped {
        channel: ChannelId,
        request_id: RequestId,
        title: String,
        reason: String,
        timestamp: u64,
    },
    /// Playback was stopped and the queue cleared.
    #[serde(rename_all = "camelCase")]
    Stopped {
        channel: ChannelId,
        /// Number of requests (current plus pending) that were discarded.
        cleared: usize,
        timestamp: u64,
    },
    /// The queue ran out; nothing is playing.
    Idle { channel: ChannelId, timestamp: u64 },
    Paused { channel: ChannelId, timestamp: u64 },
    Resumed { channel: ChannelId, timestamp: u64 },
}

impl PlaybackEvent {
    /// Returns the channel this event belongs to.
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::Queued { channel, .. }
            | Self::Started { channel, .. }
            | Self::Finished { channel, .. }
            | Self::Skipped { channel, .. }
            | Self::Dropped { channel, .. }
            | Self::Stopped { channel, .. }
            | Self::Idle { channel, .. }
            | Self::Paused { channel, .. }
            | Self::Resumed { channel, .. } => *channel,
        }
    }
}

/// Events related to the live audio session of a channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The transport joined the channel's live session.
    Joined { channel: ChannelId, timestamp: u64 },
    /// The transport left the channel's live session.
    Left { channel: ChannelId, timestamp: u64 },
}
