//! Per-channel queue state and its store.
//!
//! Each channel's [`ChannelState`] lives behind its own `tokio::sync::Mutex`,
//! so operations on different channels never wait on each other. The store
//! hands out `Arc` clones of those mutexes; a `DashMap` reference is never
//! held across an `.await`.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::types::{ChannelId, Request};

/// Lifecycle of a channel's playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Nothing playing, no drain in progress.
    #[default]
    Idle,
    /// A drain is resolving the next item outside the lock.
    Resolving,
    Playing,
    Paused,
}

/// Queue and playback state of one channel.
///
/// Only `PlaybackController` mutates this, always while holding the channel's lock.
#[derive(Debug, Default)]
pub struct ChannelState {
    queue: VecDeque<Request>,
    current: Option<Request>,
    status: ChannelStatus,
    /// Bumped on every start and on clear. Identifies the stream in flight.
    generation: u64,
    /// Bumped on clear. Lets a drain that released the lock detect a stop.
    epoch: u64,
    /// True from the first start until the session is left.
    in_session: bool,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    /// Returns true while a track is current, paused or not.
    pub fn is_playing(&self) -> bool {
        matches!(self.status, ChannelStatus::Playing | ChannelStatus::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.status == ChannelStatus::Paused
    }

    pub fn is_idle(&self) -> bool {
        self.status == ChannelStatus::Idle
    }

    pub fn current(&self) -> Option<&Request> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.queue.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns true while the transport is joined to the channel's live session.
    pub fn in_session(&self) -> bool {
        self.in_session
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a request and returns its 1-based pending position.
    pub(crate) fn push(&mut self, request: Request, front: bool) -> usize {
        if front {
            self.queue.push_front(request);
            1
        } else {
            self.queue.push_back(request);
            self.queue.len()
        }
    }

    pub(crate) fn pop_next(&mut self) -> Option<Request> {
        self.queue.pop_front()
    }

    pub(crate) fn set_status(&mut self, status: ChannelStatus) {
        self.status = status;
    }

    /// Makes `request` current and playing under a fresh generation.
    pub(crate) fn begin(&mut self, mut request: Request, generation: u64) -> &Request {
        request.play_count += 1;
        self.generation = generation;
        self.status = ChannelStatus::Playing;
        self.in_session = true;
        self.current.insert(request)
    }

    /// Reserves the next generation number without changing state.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation + 1
    }

    /// Records that the session was left after the queue ran dry.
    pub(crate) fn end_session(&mut self) {
        self.status = ChannelStatus::Idle;
        self.in_session = false;
    }

    /// Removes the current request. Status is left for the caller to settle.
    pub(crate) fn take_current(&mut self) -> Option<Request> {
        self.current.take()
    }

    /// Empties the channel and returns everything it held, current first.
    pub(crate) fn clear(&mut self) -> Vec<Request> {
        let mut drained = Vec::with_capacity(self.queue.len() + 1);
        drained.extend(self.current.take());
        drained.extend(self.queue.drain(..));
        self.status = ChannelStatus::Idle;
        self.in_session = false;
        self.generation += 1;
        self.epoch += 1;
        drained
    }

    /// Read-only projection for rendering.
    pub fn snapshot(&self, channel: ChannelId) -> ChannelSnapshot {
        ChannelSnapshot {
            channel,
            queue: self.queue.iter().cloned().collect(),
            current: self.current.clone(),
            is_playing: self.is_playing(),
            is_paused: self.is_paused(),
            status: self.status,
            generation: self.generation,
        }
    }
}

/// Point-in-time copy of a channel's state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub channel: ChannelId,
    pub queue: Vec<Request>,
    pub current: Option<Request>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub status: ChannelStatus,
    pub generation: u64,
}

impl ChannelSnapshot {
    /// Snapshot of a channel with no session.
    pub fn empty(channel: ChannelId) -> Self {
        ChannelState::new().snapshot(channel)
    }
}

/// Owner of every channel's state.
#[derive(Default)]
pub struct QueueStore {
    channels: DashMap<ChannelId, Arc<Mutex<ChannelState>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel's state, inserting an empty one if absent.
    pub fn get_or_create(&self, channel: ChannelId) -> Arc<Mutex<ChannelState>> {
        let entry = self.channels.entry(channel).or_insert_with(|| {
            log::debug!("[QueueStore] Creating state for {}", channel);
            Arc::new(Mutex::new(ChannelState::new()))
        });
        Arc::clone(entry.value())
    }

    /// Returns the channel's state if the channel has ever been used.
    pub fn get(&self, channel: ChannelId) -> Option<Arc<Mutex<ChannelState>>> {
        self.channels.get(&channel).map(|s| Arc::clone(s.value()))
    }

    /// Resets a channel to empty and idle, keeping its entry.
    ///
    /// Returns the requests that were held. This does not touch the transport.
    pub async fn clear(&self, channel: ChannelId) -> Vec<Request> {
        match self.get(channel) {
            Some(state) => state.lock().await.clear(),
            None => Vec::new(),
        }
    }

    /// Returns every known channel, sorted.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
