//! Per-channel playback orchestration.
//!
//! Responsibilities:
//! - Admit requests to a channel's queue (eager, URL-stream and deferred protocols)
//! - Drain the queue into the streaming transport, dropping items that fail
//! - Advance on stream end or skip, ignoring stale stream-end events
//! - Stop/pause/resume, and release downloaded files once nothing needs them
//! - Emit playback events
//!
//! Every mutation of a channel runs while holding that channel's lock. Media
//! resolution and duration probing never run under the lock.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{PlaybackError, PlaybackResult};
use crate::events::{EventEmitter, PlaybackEvent, SessionEvent};
use crate::media::retry::with_retry;
use crate::media::{DurationProbe, MediaJanitor, MediaResolver, ResolvedMedia, TrackDuration};
use crate::services::queue_store::{ChannelSnapshot, ChannelState, ChannelStatus, QueueStore};
use crate::state::Config;
use crate::transport::{StreamStart, StreamingTransport};
use crate::types::{ChannelId, Request, RequestId, UserRef};
use crate::utils::{is_http_url, now_millis};

/// Limits applied by the controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Maximum number of pending requests per channel.
    pub max_queue_size: usize,
    /// Longest accepted track, if limited.
    pub duration_limit_secs: Option<u64>,
    /// Backoff for transient first-attempt resolution failures.
    pub resolve_retry_delays_ms: Vec<u64>,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            duration_limit_secs: config.duration_limit_secs(),
            resolve_retry_delays_ms: config.resolve_retry_delays_ms.clone(),
        }
    }
}

/// Result of a playback transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "request", rename_all = "camelCase")]
pub enum Outcome {
    /// A request started streaming.
    Started(Request),
    /// The queue is exhausted; the session was left.
    Idle,
    /// Something is already playing or being resolved; nothing changed.
    Busy,
    /// The stream-end event does not refer to the current stream; nothing changed.
    Stale,
    /// The channel was stopped while the next item was being resolved.
    Cancelled,
}

/// Result of admitting a request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResult {
    /// 0 if the request is now playing, otherwise its 1-based pending position.
    pub position: usize,
    pub request: Request,
    pub now_playing: bool,
}

/// Result of a stop.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    /// Requests (current and pending) that were discarded.
    pub cleared: usize,
}

/// What a queue drain did.
struct DrainReport {
    outcome: Outcome,
    dropped: Vec<(RequestId, PlaybackError)>,
}

impl DrainReport {
    fn take_dropped(&mut self, id: RequestId) -> Option<PlaybackError> {
        let index = self.dropped.iter().position(|(dropped, _)| *dropped == id)?;
        Some(self.dropped.swap_remove(index).1)
    }
}

type ChannelGuard = OwnedMutexGuard<ChannelState>;

/// Service that owns every playback transition.
pub struct PlaybackController {
    store: Arc<QueueStore>,
    transport: Arc<dyn StreamingTransport>,
    resolver: Arc<dyn MediaResolver>,
    probe: Arc<dyn DurationProbe>,
    janitor: Arc<MediaJanitor>,
    emitter: Arc<dyn EventEmitter>,
    settings: ControllerSettings,
}

impl PlaybackController {
    pub fn new(
        store: Arc<QueueStore>,
        transport: Arc<dyn StreamingTransport>,
        resolver: Arc<dyn MediaResolver>,
        probe: Arc<dyn DurationProbe>,
        janitor: Arc<MediaJanitor>,
        emitter: Arc<dyn EventEmitter>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            transport,
            resolver,
            probe,
            janitor,
            emitter,
            settings,
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        self.emitter.emit_playback(event);
    }

    fn emit_session(&self, event: SessionEvent) {
        self.emitter.emit_session(event);
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves `query` (with retry on transient failure) and enqueues it.
    pub async fn enqueue_query(
        &self,
        channel: ChannelId,
        origin: ChannelId,
        query: &str,
        requested_by: UserRef,
        front: bool,
    ) -> PlaybackResult<EnqueueResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::InvalidRequest("empty query".to_string()));
        }

        let resolved = with_retry(query, &self.settings.resolve_retry_delays_ms, || {
            self.resolver.resolve(query)
        })
        .await?;
        // Another channel may share this file and release it before we are admitted.
        self.janitor.track(&resolved.media);

        if let Err(e) = self.check_duration(&resolved) {
            log::info!(
                "[PlaybackController] Rejecting '{}' in {}: {}",
                resolved.title,
                channel,
                e
            );
            self.janitor.release(&resolved.media).await;
            return Err(e);
        }

        let request = Request::from_resolved(resolved, requested_by, query, origin);
        self.admit(channel, request, front).await
    }

    /// Enqueues a live URL stream. The duration is probed first; an unknown
    /// length is kept as [`TrackDuration::Unknown`].
    pub async fn enqueue_stream_url(
        &self,
        channel: ChannelId,
        origin: ChannelId,
        url: &str,
        title: Option<&str>,
        requested_by: UserRef,
        front: bool,
    ) -> PlaybackResult<EnqueueResult> {
        let url = url.trim();
        if !is_http_url(url) {
            return Err(PlaybackError::InvalidRequest(format!(
                "not a stream URL: {url}"
            )));
        }

        let duration = TrackDuration::from_secs(self.probe.probe(url).await);
        if duration.is_unknown() {
            log::info!("[PlaybackController] Length of {} is unknown", url);
        }

        let request = Request::live_stream(
            url,
            title.unwrap_or("Live Stream"),
            duration,
            requested_by,
            origin,
        );
        self.admit(channel, request, front).await
    }

    /// Enqueues metadata only; the media is resolved when the request reaches
    /// the head of the queue.
    pub async fn enqueue_deferred(
        &self,
        channel: ChannelId,
        origin: ChannelId,
        query: &str,
        title: Option<&str>,
        requested_by: UserRef,
        front: bool,
    ) -> PlaybackResult<EnqueueResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::InvalidRequest("empty query".to_string()));
        }
        let request = Request::deferred(query, title.unwrap_or(query), requested_by, origin);
        self.admit(channel, request, front).await
    }

    /// Admits a request. `front` inserts it at the head of the pending queue.
    ///
    /// If the channel is idle the queue is drained right away; when that drain
    /// drops this very request, the reason is returned as the error, and a stop
    /// that discards it before it starts yields [`PlaybackError::Stopped`].
    pub async fn enqueue(
        &self,
        channel: ChannelId,
        request: Request,
        front: bool,
    ) -> PlaybackResult<EnqueueResult> {
        if let Some(handle) = request.file_handle() {
            self.janitor.track(handle);
        }
        self.admit(channel, request, front).await
    }

    /// Admits a request whose downloaded file, if any, is already tracked.
    async fn admit(
        &self,
        channel: ChannelId,
        request: Request,
        front: bool,
    ) -> PlaybackResult<EnqueueResult> {
        let state = self.store.get_or_create(channel);
        let mut guard = Arc::clone(&state).lock_owned().await;

        let max = self.settings.max_queue_size;
        if guard.pending_len() >= max {
            drop(guard);
            log::info!(
                "[PlaybackController] Queue full in {} ({}), rejecting '{}'",
                channel,
                max,
                request.title
            );
            if let Some(handle) = request.file_handle() {
                self.janitor.release(handle).await;
            }
            return Err(PlaybackError::QueueFull { max });
        }

        let id = request.id;
        let position = guard.push(request.clone(), front);
        log::info!(
            "[PlaybackController] Queued '{}' in {} at position {}{}",
            request.title,
            channel,
            position,
            if front { " (front)" } else { "" }
        );
        self.emit(PlaybackEvent::Queued {
            channel,
            request: request.clone(),
            position,
            timestamp: now_millis(),
        });

        if !guard.is_idle() {
            return Ok(EnqueueResult {
                position,
                request,
                now_playing: false,
            });
        }

        let (guard, mut report) = self.drain(channel, &state, guard).await;
        if let Some(reason) = report.take_dropped(id) {
            return Err(reason);
        }

        if let Some(current) = guard.current().filter(|c| c.id == id) {
            return Ok(EnqueueResult {
                position: 0,
                request: current.clone(),
                now_playing: true,
            });
        }

        let Some(index) = guard.pending().position(|r| r.id == id) else {
            log::info!(
                "[PlaybackController] '{}' in {} was discarded by a stop",
                request.title,
                channel
            );
            return Err(PlaybackError::Stopped);
        };
        Ok(EnqueueResult {
            position: index + 1,
            request,
            now_playing: false,
        })
    }

    fn check_duration(&self, resolved: &ResolvedMedia) -> PlaybackResult<()> {
        match (self.settings.duration_limit_secs, resolved.duration) {
            (Some(limit), TrackDuration::Known(secs)) if secs > limit => {
                Err(PlaybackError::DurationLimitExceeded {
                    limit_minutes: limit / 60,
                })
            }
            _ => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts the head of the queue if the channel is idle.
    pub async fn start_or_continue(&self, channel: ChannelId) -> Outcome {
        let state = self.store.get_or_create(channel);
        let guard = Arc::clone(&state).lock_owned().await;
        if !guard.is_idle() {
            return Outcome::Busy;
        }
        let (_guard, report) = self.drain(channel, &state, guard).await;
        report.outcome
    }

    /// Finishes the current track and plays the next one.
    ///
    /// `Some(generation)` comes from a stream-end event and is ignored unless it
    /// matches the current stream. `None` is a user skip.
    pub async fn advance(
        &self,
        channel: ChannelId,
        generation: Option<u64>,
    ) -> PlaybackResult<Outcome> {
        let Some(state) = self.store.get(channel) else {
            return match generation {
                Some(_) => Ok(Outcome::Stale),
                None => Err(PlaybackError::NotPlaying),
            };
        };
        let mut guard = Arc::clone(&state).lock_owned().await;

        match generation {
            Some(g) if guard.current().is_none() || guard.generation() != g => {
                log::debug!(
                    "[PlaybackController] Ignoring stale stream end in {} (event {}, current {})",
                    channel,
                    g,
                    guard.generation()
                );
                return Ok(Outcome::Stale);
            }
            None if !guard.is_playing() => return Err(PlaybackError::NotPlaying),
            _ => {}
        }

        let Some(finished) = guard.take_current() else {
            return Ok(Outcome::Stale);
        };
        guard.set_status(ChannelStatus::Idle);

        let event = if generation.is_some() {
            log::info!("[PlaybackController] '{}' finished in {}", finished.title, channel);
            PlaybackEvent::Finished {
                channel,
                request_id: finished.id,
                title: finished.title.clone(),
                timestamp: now_millis(),
            }
        } else {
            log::info!("[PlaybackController] '{}' skipped in {}", finished.title, channel);
            PlaybackEvent::Skipped {
                channel,
                request_id: finished.id,
                title: finished.title.clone(),
                timestamp: now_millis(),
            }
        };
        self.emit(event);

        let (guard, report) = self.drain(channel, &state, guard).await;
        drop(guard);

        // The transport has moved on (new stream or left), so the file is free.
        if let Some(handle) = finished.file_handle() {
            self.janitor.release(handle).await;
        }
        Ok(report.outcome)
    }

    /// Skips the current track.
    pub async fn skip(&self, channel: ChannelId) -> PlaybackResult<Outcome> {
        self.advance(channel, None).await
    }

    /// Clears the channel, leaves its session and releases every held file.
    ///
    /// Stopping an idle channel still leaves the session.
    pub async fn stop(&self, channel: ChannelId) -> StopResult {
        let (cleared, had_session) = match self.store.get(channel) {
            Some(state) => {
                let mut guard = state.lock().await;
                let had_session = guard.in_session();
                let cleared = guard.clear();
                self.leave(channel).await;
                (cleared, had_session)
            }
            None => {
                self.leave(channel).await;
                (Vec::new(), false)
            }
        };

        for request in &cleared {
            if let Some(handle) = request.file_handle() {
                self.janitor.release(handle).await;
            }
        }

        log::info!(
            "[PlaybackController] Stopped {} ({} request(s) cleared)",
            channel,
            cleared.len()
        );
        self.emit(PlaybackEvent::Stopped {
            channel,
            cleared: cleared.len(),
            timestamp: now_millis(),
        });
        if had_session {
            self.emit_session(SessionEvent::Left {
                channel,
                timestamp: now_millis(),
            });
        }

        StopResult {
            cleared: cleared.len(),
        }
    }

    pub async fn pause(&self, channel: ChannelId) -> PlaybackResult<()> {
        let state = self.store.get(channel).ok_or(PlaybackError::NotPlaying)?;
        let mut guard = state.lock().await;
        if guard.status() != ChannelStatus::Playing {
            return Err(PlaybackError::NotPlaying);
        }

        self.transport.pause(channel).await?;
        guard.set_status(ChannelStatus::Paused);
        log::info!("[PlaybackController] Paused {}", channel);
        self.emit(PlaybackEvent::Paused {
            channel,
            timestamp: now_millis(),
        });
        Ok(())
    }

    pub async fn resume(&self, channel: ChannelId) -> PlaybackResult<()> {
        let state = self.store.get(channel).ok_or(PlaybackError::NotPlaying)?;
        let mut guard = state.lock().await;
        match guard.status() {
            ChannelStatus::Paused => {}
            ChannelStatus::Playing => return Err(PlaybackError::NotPaused),
            ChannelStatus::Idle | ChannelStatus::Resolving => {
                return Err(PlaybackError::NotPlaying)
            }
        }

        self.transport.resume(channel).await?;
        guard.set_status(ChannelStatus::Playing);
        log::info!("[PlaybackController] Resumed {}", channel);
        self.emit(PlaybackEvent::Resumed {
            channel,
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Returns a copy of the channel's state, or `None` if it has no session.
    pub async fn snapshot(&self, channel: ChannelId) -> Option<ChannelSnapshot> {
        let state = self.store.get(channel)?;
        let guard = state.lock().await;
        Some(guard.snapshot(channel))
    }

    /// Returns every channel that has had a session.
    pub fn channels(&self) -> Vec<ChannelId> {
        self.store.channels()
    }

    /// Stops every channel.
    pub async fn shutdown(&self) {
        for channel in self.store.channels() {
            self.stop(channel).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Drain
    // ─────────────────────────────────────────────────────────────────────────

    async fn leave(&self, channel: ChannelId) {
        if let Err(e) = self.transport.leave(channel).await {
            log::warn!(
                "[PlaybackController] Failed to leave session in {}: {}",
                channel,
                e
            );
        }
    }

    /// Pops requests until one starts or the queue is empty.
    ///
    /// Entered and left with the channel lock held. The lock is released only
    /// while a deferred request is being resolved; a stop during that window is
    /// detected through the channel epoch and ends the drain untouched.
    async fn drain(
        &self,
        channel: ChannelId,
        state: &Arc<Mutex<ChannelState>>,
        mut guard: ChannelGuard,
    ) -> (ChannelGuard, DrainReport) {
        let mut dropped = Vec::new();
        let mut attempts = 0usize;

        loop {
            let Some(mut request) = guard.pop_next() else {
                let in_session = guard.in_session();
                guard.end_session();
                self.leave(channel).await;
                log::info!(
                    "[PlaybackController] Queue finished in {} after {} attempt(s)",
                    channel,
                    attempts
                );
                self.emit(PlaybackEvent::Idle {
                    channel,
                    timestamp: now_millis(),
                });
                if in_session {
                    self.emit_session(SessionEvent::Left {
                        channel,
                        timestamp: now_millis(),
                    });
                }
                let report = DrainReport {
                    outcome: Outcome::Idle,
                    dropped,
                };
                return (guard, report);
            };
            attempts += 1;

            if request.needs_resolution() {
                guard.set_status(ChannelStatus::Resolving);
                let epoch = guard.epoch();
                drop(guard);

                log::info!(
                    "[PlaybackController] Resolving '{}' for {}",
                    request.title,
                    channel
                );
                let resolved = self.resolver.resolve(&request.source).await;
                if let Ok(resolved) = &resolved {
                    self.janitor.track(&resolved.media);
                }
                guard = Arc::clone(state).lock_owned().await;

                if guard.epoch() != epoch {
                    log::info!(
                        "[PlaybackController] {} was stopped while resolving '{}'",
                        channel,
                        request.title
                    );
                    if let Ok(resolved) = resolved {
                        self.janitor.release(&resolved.media).await;
                    }
                    let report = DrainReport {
                        outcome: Outcome::Cancelled,
                        dropped,
                    };
                    return (guard, report);
                }

                let resolved = match resolved {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        self.drop_request(channel, request, e.into(), &mut dropped)
                            .await;
                        continue;
                    }
                };
                if let Err(e) = self.check_duration(&resolved) {
                    self.janitor.release(&resolved.media).await;
                    self.drop_request(channel, request, e, &mut dropped).await;
                    continue;
                }
                request.attach(resolved);
            }

            let Some(media) = request.media.clone() else {
                let reason = PlaybackError::InvalidRequest("request has no media".to_string());
                self.drop_request(channel, request, reason, &mut dropped)
                    .await;
                continue;
            };

            if !media.is_present().await {
                let path = media.path().map(Path::to_path_buf).unwrap_or_default();
                self.drop_request(channel, request, PlaybackError::ResourceMissing(path), &mut dropped)
                    .await;
                continue;
            }

            let generation = guard.next_generation();
            let start = StreamStart {
                media,
                duration: request.duration,
                generation,
            };
            if let Err(e) = self.transport.join_and_play(channel, start).await {
                self.drop_request(channel, request, e.into(), &mut dropped)
                    .await;
                continue;
            }

            let joined = !guard.in_session();
            let started = guard.begin(request, generation).clone();
            log::info!(
                "[PlaybackController] Started '{}' in {} (generation {}, duration {})",
                started.title,
                channel,
                generation,
                started.duration
            );
            if joined {
                self.emit_session(SessionEvent::Joined {
                    channel,
                    timestamp: now_millis(),
                });
            }
            self.emit(PlaybackEvent::Started {
                channel,
                request: started.clone(),
                generation,
                timestamp: now_millis(),
            });
            let report = DrainReport {
                outcome: Outcome::Started(started),
                dropped,
            };
            return (guard, report);
        }
    }

    /// Discards a request that could not be played and frees its file.
    async fn drop_request(
        &self,
        channel: ChannelId,
        request: Request,
        reason: PlaybackError,
        dropped: &mut Vec<(RequestId, PlaybackError)>,
    ) {
        log::warn!(
            "[PlaybackController] Dropping '{}' in {}: {}",
            request.title,
            channel,
            reason
        );
        if let Some(handle) = request.file_handle() {
            self.janitor.release(handle).await;
        }
        self.emit(PlaybackEvent::Dropped {
            channel,
            request_id: request.id,
            title: request.title,
            reason: reason.to_string(),
            timestamp: now_millis(),
        });
        dropped.push((request.id, reason));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::media::{MediaHandle, ResolutionError};
    use crate::test_support::{Harness, TransportCall};

    const CHAT: ChannelId = ChannelId(-1001);
    const OTHER: ChannelId = ChannelId(-2002);

    async fn play(h: &Harness, query: &str, secs: u64) -> PlaybackResult<EnqueueResult> {
        h.resolver.found(query, Some(secs));
        h.controller
            .enqueue_query(CHAT, CHAT, query, Harness::user(), false)
            .await
    }

    async fn generation(h: &Harness) -> u64 {
        h.controller.snapshot(CHAT).await.unwrap().generation
    }

    async fn pending_titles(h: &Harness) -> Vec<String> {
        h.controller
            .snapshot(CHAT)
            .await
            .map(|s| s.queue.into_iter().map(|r| r.title).collect())
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue order
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_request_plays_then_later_ones_queue() {
        let h = Harness::new();

        let a = play(&h, "song a", 180).await.unwrap();
        assert!(a.now_playing);
        assert_eq!(a.position, 0);
        assert_eq!(a.request.play_count, 1);

        let b = play(&h, "song b", 200).await.unwrap();
        assert!(!b.now_playing);
        assert_eq!(b.position, 1);

        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert_eq!(snap.current.unwrap().title, "Song A");
        assert!(snap.is_playing);
        assert_eq!(pending_titles(&h).await, ["Song B"]);
    }

    #[tokio::test]
    async fn back_inserts_are_fifo() {
        let h = Harness::new();
        play(&h, "now", 60).await.unwrap();
        for (i, q) in ["one", "two", "three", "four"].iter().enumerate() {
            let res = play(&h, q, 60).await.unwrap();
            assert_eq!(res.position, i + 1);
        }
        assert_eq!(pending_titles(&h).await, ["One", "Two", "Three", "Four"]);
    }

    #[tokio::test]
    async fn front_insert_jumps_queue_without_preempting() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        play(&h, "b", 180).await.unwrap();

        h.resolver.found("c", Some(100));
        let c = h
            .controller
            .enqueue_query(CHAT, CHAT, "c", Harness::user(), true)
            .await
            .unwrap();
        assert_eq!(c.position, 1);

        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert_eq!(snap.current.unwrap().title, "A");
        assert_eq!(pending_titles(&h).await, ["C", "B"]);

        let gen_a = generation(&h).await;
        let outcome = h.controller.advance(CHAT, Some(gen_a)).await.unwrap();
        assert!(matches!(outcome, Outcome::Started(ref r) if r.title == "C"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Advance
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stream_end_advances_and_releases_previous_file() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        play(&h, "b", 120).await.unwrap();
        let a_path = h.resolver.path_for("a");

        let gen_a = generation(&h).await;
        let outcome = h.controller.advance(CHAT, Some(gen_a)).await.unwrap();
        assert!(matches!(outcome, Outcome::Started(ref r) if r.title == "B"));
        assert!(!a_path.exists());
        assert!(pending_titles(&h).await.is_empty());

        let gen_b = generation(&h).await;
        let outcome = h.controller.advance(CHAT, Some(gen_b)).await.unwrap();
        assert!(matches!(outcome, Outcome::Idle));
        assert_eq!(h.transport.leave_count(CHAT), 1);
        assert!(!h.resolver.path_for("b").exists());

        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert!(!snap.is_playing);
        assert!(snap.current.is_none());
    }

    #[tokio::test]
    async fn stale_stream_end_after_skip_is_ignored() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        play(&h, "b", 180).await.unwrap();
        play(&h, "c", 180).await.unwrap();
        let gen_a = generation(&h).await;

        let skipped = h.controller.skip(CHAT).await.unwrap();
        assert!(matches!(skipped, Outcome::Started(ref r) if r.title == "B"));

        let late = h.controller.advance(CHAT, Some(gen_a)).await.unwrap();
        assert!(matches!(late, Outcome::Stale));

        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert_eq!(snap.current.unwrap().title, "B");
        assert_eq!(pending_titles(&h).await, ["C"]);
    }

    #[tokio::test]
    async fn racing_skip_and_stream_end_pop_once() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        play(&h, "b", 180).await.unwrap();
        play(&h, "c", 180).await.unwrap();
        let gen_a = generation(&h).await;

        let (skip, ended) = tokio::join!(
            h.controller.skip(CHAT),
            h.controller.advance(CHAT, Some(gen_a))
        );
        assert!(matches!(skip.unwrap(), Outcome::Started(ref r) if r.title == "B"));
        assert!(matches!(ended.unwrap(), Outcome::Stale));
        assert_eq!(pending_titles(&h).await, ["C"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicate_stream_end_events_advance_once() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        for q in ["b", "c", "d"] {
            play(&h, q, 180).await.unwrap();
        }
        let gen_a = generation(&h).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let controller = Arc::clone(&h.controller);
            tasks.push(tokio::spawn(async move {
                controller.advance(CHAT, Some(gen_a)).await
            }));
        }

        let mut started = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                Outcome::Started(_) => started += 1,
                Outcome::Stale => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(pending_titles(&h).await, ["C", "D"]);

        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert!(snap.is_playing && snap.current.is_some());
    }

    #[tokio::test]
    async fn stream_end_for_unknown_channel_is_stale() {
        let h = Harness::new();
        let outcome = h.controller.advance(ChannelId(5), Some(1)).await.unwrap();
        assert!(matches!(outcome, Outcome::Stale));
    }

    #[tokio::test]
    async fn skip_when_idle_is_rejected() {
        let h = Harness::new();
        assert!(matches!(
            h.controller.skip(CHAT).await,
            Err(PlaybackError::NotPlaying)
        ));

        play(&h, "a", 10).await.unwrap();
        let gen_a = generation(&h).await;
        h.controller.advance(CHAT, Some(gen_a)).await.unwrap();
        assert!(matches!(
            h.controller.skip(CHAT).await,
            Err(PlaybackError::NotPlaying)
        ));
    }

    #[tokio::test]
    async fn start_or_continue_is_busy_while_playing() {
        let h = Harness::new();
        play(&h, "a", 10).await.unwrap();
        assert!(matches!(
            h.controller.start_or_continue(CHAT).await,
            Outcome::Busy
        ));
        assert!(matches!(
            h.controller.start_or_continue(ChannelId(77)).await,
            Outcome::Idle
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Drop-and-advance
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn failed_deferred_item_is_dropped_during_drain() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        h.resolver
            .failing("broken", || ResolutionError::NotFound("broken".into()));
        h.resolver.found("good", Some(90));

        h.controller
            .enqueue_deferred(CHAT, CHAT, "broken", None, Harness::user(), false)
            .await
            .unwrap();
        h.controller
            .enqueue_deferred(CHAT, CHAT, "good", None, Harness::user(), false)
            .await
            .unwrap();

        let gen_a = generation(&h).await;
        let outcome = h.controller.advance(CHAT, Some(gen_a)).await.unwrap();
        match outcome {
            Outcome::Started(r) => {
                assert_eq!(r.title, "Good");
                assert_eq!(r.duration, TrackDuration::Known(90));
            }
            other => panic!("expected good to start, got {other:?}"),
        }

        let dropped = h
            .emitter
            .playback_events()
            .into_iter()
            .filter(|e| matches!(e, PlaybackEvent::Dropped { .. }))
            .count();
        assert_eq!(dropped, 1);
    }

    #[tokio::test]
    async fn missing_file_is_dropped_and_queue_ends() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        play(&h, "b", 180).await.unwrap();
        std::fs::remove_file(h.resolver.path_for("b")).unwrap();

        let gen_a = generation(&h).await;
        let outcome = h.controller.advance(CHAT, Some(gen_a)).await.unwrap();
        assert!(matches!(outcome, Outcome::Idle));
        assert_eq!(h.transport.leave_count(CHAT), 1);
        assert_eq!(h.janitor.tracked_files(), 0);
    }

    #[tokio::test]
    async fn own_first_attempt_failure_is_reported() {
        let h = Harness::new();
        let err = h
            .controller
            .enqueue_query(CHAT, CHAT, "nothing matches", Harness::user(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Resolution(ResolutionError::NotFound(_))
        ));

        let err = h
            .controller
            .enqueue_deferred(CHAT, CHAT, "still nothing", None, Harness::user(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Resolution(_)));
        assert!(!h.controller.snapshot(CHAT).await.unwrap().is_playing);
    }

    #[tokio::test]
    async fn missing_live_session_rejects_and_releases_file() {
        let h = Harness::new();
        h.transport.refuse(CHAT);

        let err = play(&h, "a", 180).await.unwrap_err();
        assert!(matches!(err, PlaybackError::TransportJoin(_)));
        assert!(!h.resolver.path_for("a").exists());
        assert_eq!(h.janitor.tracked_files(), 0);
    }

    #[tokio::test]
    async fn prebuilt_request_file_is_tracked_until_finished() {
        let h = Harness::new();
        let path = h.dir.path().join("prebuilt.mp3");
        std::fs::write(&path, b"audio").unwrap();
        let resolved = ResolvedMedia {
            id: "prebuilt".into(),
            title: "prebuilt".into(),
            uploader: "Uploader".into(),
            duration: TrackDuration::Known(30),
            media: MediaHandle::File(path.clone()),
            source_url: None,
            thumbnail: None,
        };
        let request = Request::from_resolved(resolved, Harness::user(), "prebuilt", CHAT);

        let res = h.controller.enqueue(CHAT, request, false).await.unwrap();
        assert!(res.now_playing);
        assert_eq!(h.janitor.ref_count(&MediaHandle::File(path.clone())), 1);

        let playing = generation(&h).await;
        h.controller.advance(CHAT, Some(playing)).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn shared_download_outlives_other_channel_finishing() {
        let h = Harness::new();
        play(&h, "x", 60).await.unwrap();
        let gen_x = generation(&h).await;
        let path = h.resolver.path_for("x");
        let handle = MediaHandle::File(path.clone());

        // OTHER resolves the same track, then waits on its channel lock.
        let held = h.store.get_or_create(OTHER).lock_owned().await;
        let controller = Arc::clone(&h.controller);
        let other = tokio::spawn(async move {
            controller
                .enqueue_query(OTHER, OTHER, "x", Harness::user(), false)
                .await
        });
        for _ in 0..200 {
            if h.janitor.ref_count(&handle) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.janitor.ref_count(&handle), 2);

        let outcome = h.controller.advance(CHAT, Some(gen_x)).await.unwrap();
        assert!(matches!(outcome, Outcome::Idle));
        assert!(path.exists());

        drop(held);
        let res = other.await.unwrap().unwrap();
        assert!(res.now_playing);
        assert_eq!(h.transport.plays(OTHER), [handle]);

        let gen_other = h.controller.snapshot(OTHER).await.unwrap().generation;
        h.controller.advance(OTHER, Some(gen_other)).await.unwrap();
        assert!(!path.exists());
        assert_eq!(h.janitor.tracked_files(), 0);
    }

    #[tokio::test]
    async fn locked_channel_does_not_block_others() {
        let h = Harness::new();
        h.resolver.found("b1", Some(60));
        h.resolver.found("b2", Some(60));

        let held = h.store.get_or_create(CHAT).lock_owned().await;
        let controller = Arc::clone(&h.controller);
        let blocked = tokio::spawn(async move { controller.skip(CHAT).await });
        tokio::task::yield_now().await;

        let other_channel = async {
            for q in ["b1", "b2"] {
                h.controller
                    .enqueue_query(OTHER, OTHER, q, Harness::user(), false)
                    .await
                    .unwrap();
            }
            h.controller.skip(OTHER).await.unwrap()
        };
        let outcome = tokio::time::timeout(Duration::from_secs(5), other_channel)
            .await
            .expect("OTHER waited on CHAT's lock");
        assert!(matches!(outcome, Outcome::Started(ref r) if r.title == "B2"));
        assert!(!blocked.is_finished());

        drop(held);
        assert!(matches!(
            blocked.await.unwrap(),
            Err(PlaybackError::NotPlaying)
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission limits
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn full_queue_rejects_and_deletes_download() {
        let h = Harness::with_settings(ControllerSettings {
            max_queue_size: 2,
            duration_limit_secs: None,
            resolve_retry_delays_ms: vec![],
        });
        play(&h, "a", 10).await.unwrap();
        play(&h, "b", 10).await.unwrap();
        play(&h, "c", 10).await.unwrap();

        let err = play(&h, "d", 10).await.unwrap_err();
        assert!(matches!(err, PlaybackError::QueueFull { max: 2 }));
        assert!(!h.resolver.path_for("d").exists());
        assert_eq!(pending_titles(&h).await, ["B", "C"]);
    }

    #[tokio::test]
    async fn overlong_track_is_rejected() {
        let h = Harness::with_settings(ControllerSettings {
            max_queue_size: 10,
            duration_limit_secs: Some(600),
            resolve_retry_delays_ms: vec![],
        });
        let err = play(&h, "long mix", 601).await.unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::DurationLimitExceeded { limit_minutes: 10 }
        ));
        assert!(!h.resolver.path_for("long mix").exists());
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn transient_resolution_is_retried() {
        let h = Harness::new();
        h.resolver.flaky("flaky", 2, Some(30));
        let res = h
            .controller
            .enqueue_query(CHAT, CHAT, "flaky", Harness::user(), false)
            .await
            .unwrap();
        assert!(res.now_playing);
        assert_eq!(h.resolver.calls().len(), 3);
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let h = Harness::new();
        let err = h
            .controller
            .enqueue_query(CHAT, CHAT, "   ", Harness::user(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidRequest(_)));
        assert!(h.controller.snapshot(CHAT).await.is_none());
    }

    #[tokio::test]
    async fn failed_probe_records_unknown_duration() {
        let h = Harness::with_probe(None);
        let res = h
            .controller
            .enqueue_stream_url(
                CHAT,
                CHAT,
                "https://radio.example/live",
                Some("night radio"),
                Harness::user(),
                false,
            )
            .await
            .unwrap();
        assert!(res.now_playing);
        assert_eq!(res.request.duration, TrackDuration::Unknown);
        assert_eq!(res.request.title, "Night Radio");
        assert_eq!(
            h.transport.plays(CHAT),
            [MediaHandle::Remote("https://radio.example/live".into())]
        );
    }

    #[tokio::test]
    async fn probed_stream_keeps_known_duration() {
        let h = Harness::with_probe(Some(3600));
        let res = h
            .controller
            .enqueue_stream_url(CHAT, CHAT, "https://cdn.example/set.mp3", None, Harness::user(), false)
            .await
            .unwrap();
        assert_eq!(res.request.duration, TrackDuration::Known(3600));
    }

    #[tokio::test]
    async fn stream_url_must_be_http() {
        let h = Harness::new();
        let err = h
            .controller
            .enqueue_stream_url(CHAT, CHAT, "ftp://x", None, Harness::user(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn same_file_queued_twice_survives_first_release() {
        let h = Harness::new();
        play(&h, "loop", 60).await.unwrap();
        play(&h, "loop", 60).await.unwrap();
        let path = h.resolver.path_for("loop");

        let first = generation(&h).await;
        h.controller.advance(CHAT, Some(first)).await.unwrap();
        assert!(path.exists());

        let second = generation(&h).await;
        h.controller.advance(CHAT, Some(second)).await.unwrap();
        assert!(!path.exists());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stop / pause / resume
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_is_idempotent() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        play(&h, "b", 180).await.unwrap();

        let first = h.controller.stop(CHAT).await;
        assert_eq!(first.cleared, 2);
        assert!(!h.resolver.path_for("a").exists());
        assert!(!h.resolver.path_for("b").exists());
        assert_eq!(h.janitor.tracked_files(), 0);

        let second = h.controller.stop(CHAT).await;
        assert_eq!(second.cleared, 0);
        assert_eq!(h.transport.leave_count(CHAT), 2);

        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert!(snap.queue.is_empty() && snap.current.is_none() && !snap.is_playing);
    }

    #[tokio::test]
    async fn stop_on_unknown_channel_still_leaves() {
        let h = Harness::new();
        assert_eq!(h.controller.stop(ChannelId(9)).await.cleared, 0);
        assert_eq!(h.transport.leave_count(ChannelId(9)), 1);
    }

    #[tokio::test]
    async fn stop_while_resolving_cancels_drain() {
        let h = Harness::new();
        h.resolver.found("slow", Some(100));
        let gate = h.resolver.gate();

        let controller = Arc::clone(&h.controller);
        let pending = tokio::spawn(async move {
            controller
                .enqueue_deferred(CHAT, CHAT, "slow", None, Harness::user(), false)
                .await
        });

        while h.resolver.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert_eq!(snap.status, ChannelStatus::Resolving);

        h.controller.stop(CHAT).await;
        gate.notify_one();
        assert!(matches!(
            pending.await.unwrap(),
            Err(PlaybackError::Stopped)
        ));

        assert!(h.transport.plays(CHAT).is_empty());
        assert!(!h.resolver.path_for("slow").exists());
        assert!(!h.controller.snapshot(CHAT).await.unwrap().is_playing);
    }

    #[tokio::test]
    async fn stop_while_resolving_next_track_reports_leaving() {
        let h = Harness::new();
        play(&h, "a", 180).await.unwrap();
        h.resolver.found("slow", Some(100));
        h.controller
            .enqueue_deferred(CHAT, CHAT, "slow", None, Harness::user(), false)
            .await
            .unwrap();
        let gen_a = generation(&h).await;
        let gate = h.resolver.gate();

        let controller = Arc::clone(&h.controller);
        let ended = tokio::spawn(async move { controller.advance(CHAT, Some(gen_a)).await });

        while h.resolver.calls().len() < 2 {
            tokio::task::yield_now().await;
        }
        let snap = h.controller.snapshot(CHAT).await.unwrap();
        assert_eq!(snap.status, ChannelStatus::Resolving);

        h.controller.stop(CHAT).await;
        gate.notify_one();
        assert!(matches!(ended.await.unwrap().unwrap(), Outcome::Cancelled));

        let left = h
            .emitter
            .session_events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Left { .. }))
            .count();
        assert_eq!(left, 1);
        assert!(!h.resolver.path_for("a").exists());
        assert!(!h.resolver.path_for("slow").exists());
    }

    #[tokio::test]
    async fn pause_and_resume_follow_state() {
        let h = Harness::new();
        assert!(matches!(
            h.controller.pause(CHAT).await,
            Err(PlaybackError::NotPlaying)
        ));

        play(&h, "a", 180).await.unwrap();
        assert!(matches!(
            h.controller.resume(CHAT).await,
            Err(PlaybackError::NotPaused)
        ));

        h.controller.pause(CHAT).await.unwrap();
        assert!(h.controller.snapshot(CHAT).await.unwrap().is_paused);
        assert!(matches!(
            h.controller.pause(CHAT).await,
            Err(PlaybackError::NotPlaying)
        ));

        h.controller.resume(CHAT).await.unwrap();
        assert!(!h.controller.snapshot(CHAT).await.unwrap().is_paused);

        let calls = h.transport.calls();
        assert!(calls.contains(&TransportCall::Pause(CHAT)));
        assert!(calls.contains(&TransportCall::Resume(CHAT)));
    }

    #[tokio::test]
    async fn shutdown_stops_all_channels() {
        let h = Harness::new();
        play(&h, "a", 10).await.unwrap();
        h.resolver.found("z", Some(10));
        h.controller
            .enqueue_query(ChannelId(2), ChannelId(2), "z", Harness::user(), false)
            .await
            .unwrap();

        h.controller.shutdown().await;
        assert_eq!(h.janitor.tracked_files(), 0);
        for channel in h.controller.channels() {
            assert!(!h.controller.snapshot(channel).await.unwrap().is_playing);
        }
    }
}
