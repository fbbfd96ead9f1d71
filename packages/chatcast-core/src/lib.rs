//! Chatcast Core - per-chat audio queues for live group audio sessions.
//!
//! Every chat ("channel") owns an independent FIFO queue of playback requests
//! and at most one live audio session. The crate admits requests, streams them
//! one after another through a transport, advances when a stream ends, and
//! deletes downloaded files once nothing needs them.
//!
//! # Architecture
//!
//! - [`services`]: queue store, playback controller, stream-end processor
//! - [`media`]: resolver, duration probe, retry and file janitor
//! - [`transport`]: live session transport seam and a simulated transport
//! - [`surface`]: chat commands, callbacks and rendered replies
//! - [`events`]: event emission for WebSocket clients
//! - [`api`]: HTTP/WebSocket server
//! - [`bootstrap`]: composition root
//!
//! # Abstraction Traits
//!
//! - [`MediaResolver`](media::MediaResolver): query or URL to a playable file
//! - [`DurationProbe`](media::DurationProbe): length of a remote stream
//! - [`StreamingTransport`](transport::StreamingTransport): join, play, leave
//! - [`EventEmitter`](events::EventEmitter): domain event sink
//! - [`TaskSpawner`](runtime::TaskSpawner): background task spawning

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod media;
pub mod runtime;
pub mod services;
pub mod state;
pub mod surface;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use api::{start_server, AppState, ServerError};
pub use bootstrap::{bootstrap_services, bootstrap_services_with_transport, BootstrappedServices};
pub use error::{ChatcastError, ChatcastResult, ErrorCode, PlaybackError, PlaybackResult};
pub use events::{BroadcastEvent, BroadcastEventBridge, EventEmitter, PlaybackEvent, SessionEvent};
pub use media::{MediaHandle, ResolvedMedia, TrackDuration};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{
    ChannelSnapshot, ControllerSettings, EnqueueResult, Outcome, PlaybackController, StopResult,
};
pub use state::Config;
pub use surface::{CallbackAction, CallbackReply, Command, CommandSurface, Reply};
pub use transport::{SimulatedTransport, StreamingTransport, TransportEvent};
pub use types::{ChannelId, Request, RequestId, UserRef};
pub use utils::now_millis;
