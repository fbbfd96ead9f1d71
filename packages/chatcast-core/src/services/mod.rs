//! Application services layer.
//!
//! This module contains the playback logic that sits between the command and
//! API surfaces and the infrastructure (media/, transport/).

pub mod playback_controller;
pub mod queue_store;
pub mod stream_end_processor;

pub use playback_controller::{
    ControllerSettings, EnqueueResult, Outcome, PlaybackController, StopResult,
};
pub use queue_store::{ChannelSnapshot, ChannelState, ChannelStatus, QueueStore};
pub use stream_end_processor::StreamEndProcessor;
