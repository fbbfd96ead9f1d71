//! In-process transport that plays tracks on timers.
//!
//! Used by the headless server when no real voice transport is attached, and
//! by integration tests. Each channel gets a pretend session; starting a
//! stream arms a timer for the track's length and timer expiry reports
//! [`TransportEvent::StreamEnded`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{StreamStart, StreamingTransport, TransportError, TransportEvent, TransportResult};
use crate::media::MediaHandle;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::types::ChannelId;

/// One channel's pretend live session.
struct SimSession {
    media: MediaHandle,
    generation: u64,
    remaining: Duration,
    /// Set while the timer runs; `None` while paused.
    started_at: Option<Instant>,
    timer: Option<CancellationToken>,
}

impl SimSession {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Transport that simulates live sessions with timers.
pub struct SimulatedTransport {
    sessions: Arc<Mutex<HashMap<ChannelId, SimSession>>>,
    /// Channels where joining fails as if no voice chat were running.
    unavailable: Mutex<HashSet<ChannelId>>,
    event_tx: mpsc::Sender<TransportEvent>,
    unknown_duration: Duration,
    spawner: TokioSpawner,
    shutdown: CancellationToken,
}

impl SimulatedTransport {
    /// Creates a transport reporting stream ends on `event_tx`.
    ///
    /// Tracks of unknown length play for `unknown_duration`.
    pub fn new(
        event_tx: mpsc::Sender<TransportEvent>,
        unknown_duration: Duration,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            unavailable: Mutex::new(HashSet::new()),
            event_tx,
            unknown_duration,
            spawner,
            shutdown: CancellationToken::new(),
        }
    }

    /// Marks a channel as having (or not having) a live session to join.
    pub fn set_session_available(&self, channel: ChannelId, available: bool) {
        let mut unavailable = self.unavailable.lock();
        if available {
            unavailable.remove(&channel);
        } else {
            unavailable.insert(channel);
        }
    }

    /// Returns true if the transport is currently in the channel's session.
    #[must_use]
    pub fn is_joined(&self, channel: ChannelId) -> bool {
        self.sessions.lock().contains_key(&channel)
    }

    /// Returns the handle being streamed in a channel.
    #[must_use]
    pub fn now_streaming(&self, channel: ChannelId) -> Option<MediaHandle> {
        self.sessions.lock().get(&channel).map(|s| s.media.clone())
    }

    /// Returns the generation of the stream in a channel.
    #[must_use]
    pub fn generation(&self, channel: ChannelId) -> Option<u64> {
        self.sessions.lock().get(&channel).map(|s| s.generation)
    }

    /// Returns true if the channel's stream is paused.
    #[must_use]
    pub fn is_paused(&self, channel: ChannelId) -> bool {
        self.sessions
            .lock()
            .get(&channel)
            .is_some_and(|s| s.started_at.is_none())
    }

    /// Arms the end-of-stream timer for a session.
    fn arm_timer(&self, channel: ChannelId, session: &mut SimSession) {
        let token = self.shutdown.child_token();
        let tx = self.event_tx.clone();
        let sessions = Arc::clone(&self.sessions);
        let generation = session.generation;
        let remaining = session.remaining;

        self.spawner.spawn_cancellable(token.clone(), async move {
            tokio::time::sleep(remaining).await;

            // The session may have moved on between expiry and this lock.
            let still_current = {
                let mut sessions = sessions.lock();
                match sessions.get_mut(&channel) {
                    Some(s) if s.generation == generation && s.started_at.is_some() => {
                        s.timer = None;
                        s.started_at = None;
                        s.remaining = Duration::ZERO;
                        true
                    }
                    _ => false,
                }
            };

            if still_current {
                log::debug!(
                    "[SimulatedTransport] Stream ended in {} (generation {})",
                    channel,
                    generation
                );
                if tx
                    .send(TransportEvent::StreamEnded { channel, generation })
                    .await
                    .is_err()
                {
                    log::warn!("[SimulatedTransport] Event receiver dropped");
                }
            }
        });

        session.started_at = Some(Instant::now());
        session.timer = Some(token);
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl StreamingTransport for SimulatedTransport {
    async fn join_and_play(&self, channel: ChannelId, stream: StreamStart) -> TransportResult<()> {
        if self.unavailable.lock().contains(&channel) {
            return Err(TransportError::NoActiveSession(channel));
        }

        let length = stream
            .duration
            .as_secs()
            .map_or(self.unknown_duration, Duration::from_secs);

        let mut sessions = self.sessions.lock();
        if let Some(previous) = sessions.get_mut(&channel) {
            previous.cancel_timer();
        }

        let mut session = SimSession {
            media: stream.media,
            generation: stream.generation,
            remaining: length,
            started_at: None,
            timer: None,
        };
        self.arm_timer(channel, &mut session);
        log::info!(
            "[SimulatedTransport] Playing {} in {} for {:?} (generation {})",
            session.media,
            channel,
            length,
            session.generation
        );
        sessions.insert(channel, session);
        Ok(())
    }

    async fn leave(&self, channel: ChannelId) -> TransportResult<()> {
        if let Some(mut session) = self.sessions.lock().remove(&channel) {
            session.cancel_timer();
            log::info!("[SimulatedTransport] Left session in {}", channel);
        }
        Ok(())
    }

    async fn pause(&self, channel: ChannelId) -> TransportResult<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&channel)
            .ok_or_else(|| TransportError::Rejected(format!("not in a session in {channel}")))?;

        let started_at = session
            .started_at
            .take()
            .ok_or_else(|| TransportError::Rejected("stream is not running".to_string()))?;
        session.remaining = session.remaining.saturating_sub(started_at.elapsed());
        session.cancel_timer();
        Ok(())
    }

    async fn resume(&self, channel: ChannelId) -> TransportResult<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&channel)
            .ok_or_else(|| TransportError::Rejected(format!("not in a session in {channel}")))?;

        if session.started_at.is_some() {
            return Err(TransportError::Rejected("stream is not paused".to_string()));
        }
        self.arm_timer(channel, session);
        Ok(())
    }
}
