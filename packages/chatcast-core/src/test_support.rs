//! Recording collaborators shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::events::{EventEmitter, PlaybackEvent, SessionEvent};
use crate::media::{
    DurationProbe, MediaHandle, MediaJanitor, MediaResolver, ResolutionError, ResolveResult,
    ResolvedMedia, TrackDuration,
};
use crate::services::{ControllerSettings, PlaybackController, QueueStore};
use crate::transport::{StreamStart, StreamingTransport, TransportError, TransportResult};
use crate::types::{ChannelId, UserRef};

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Play {
        channel: ChannelId,
        media: MediaHandle,
        generation: u64,
    },
    Leave(ChannelId),
    Pause(ChannelId),
    Resume(ChannelId),
}

/// Transport that records every call and can be told to refuse channels.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    no_session: Mutex<HashSet<ChannelId>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, channel: ChannelId) {
        self.no_session.lock().insert(channel);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn leave_count(&self, channel: ChannelId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| **c == TransportCall::Leave(channel))
            .count()
    }

    pub fn plays(&self, channel: ChannelId) -> Vec<MediaHandle> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                TransportCall::Play { channel: ch, media, .. } if *ch == channel => {
                    Some(media.clone())
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StreamingTransport for RecordingTransport {
    async fn join_and_play(&self, channel: ChannelId, stream: StreamStart) -> TransportResult<()> {
        if self.no_session.lock().contains(&channel) {
            return Err(TransportError::NoActiveSession(channel));
        }
        self.calls.lock().push(TransportCall::Play {
            channel,
            media: stream.media,
            generation: stream.generation,
        });
        Ok(())
    }

    async fn leave(&self, channel: ChannelId) -> TransportResult<()> {
        self.calls.lock().push(TransportCall::Leave(channel));
        Ok(())
    }

    async fn pause(&self, channel: ChannelId) -> TransportResult<()> {
        self.calls.lock().push(TransportCall::Pause(channel));
        Ok(())
    }

    async fn resume(&self, channel: ChannelId) -> TransportResult<()> {
        self.calls.lock().push(TransportCall::Resume(channel));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

enum Scripted {
    Found { duration: Option<u64> },
    Fail(fn() -> ResolutionError),
    /// Fails with a transient error this many times, then succeeds.
    Flaky { failures: usize, duration: Option<u64> },
}

/// Resolver that writes real files into a temp directory for scripted queries.
///
/// Unknown queries fail with `NotFound`. A gate can hold resolutions until the
/// test releases them.
pub struct FakeResolver {
    dir: PathBuf,
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeResolver {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    pub fn found(&self, query: &str, duration: Option<u64>) {
        self.script
            .lock()
            .insert(query.to_string(), Scripted::Found { duration });
    }

    pub fn failing(&self, query: &str, err: fn() -> ResolutionError) {
        self.script.lock().insert(query.to_string(), Scripted::Fail(err));
    }

    pub fn flaky(&self, query: &str, failures: usize, duration: Option<u64>) {
        self.script
            .lock()
            .insert(query.to_string(), Scripted::Flaky { failures, duration });
    }

    /// Holds every later resolution until the returned `Notify` is signalled.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn path_for(&self, query: &str) -> PathBuf {
        self.dir.join(format!("{}.mp3", query.replace(' ', "_")))
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> ResolveResult<ResolvedMedia> {
        self.calls.lock().push(query.to_string());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let duration = {
            let mut script = self.script.lock();
            match script.get_mut(query) {
                None => return Err(ResolutionError::NotFound(query.to_string())),
                Some(Scripted::Fail(make)) => return Err((*make)()),
                Some(Scripted::Flaky { failures, .. }) if *failures > 0 => {
                    *failures -= 1;
                    return Err(ResolutionError::Network("connection reset".into()));
                }
                Some(Scripted::Flaky { duration, .. }) | Some(Scripted::Found { duration }) => {
                    *duration
                }
            }
        };

        let path = self.path_for(query);
        tokio::fs::write(&path, b"audio")
            .await
            .map_err(|e| ResolutionError::Io(e.to_string()))?;

        Ok(ResolvedMedia {
            id: query.replace(' ', "_"),
            title: query.to_string(),
            uploader: "Uploader".to_string(),
            duration: TrackDuration::from_secs(duration),
            media: MediaHandle::File(path),
            source_url: Some(format!("https://media.example/{}", query.replace(' ', "_"))),
            thumbnail: None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Probe / emitter
// ─────────────────────────────────────────────────────────────────────────────

pub struct FixedProbe(pub Option<u64>);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn probe(&self, _url: &str) -> Option<u64> {
        self.0
    }
}

#[derive(Default)]
pub struct RecordingEmitter {
    pub playback: Mutex<Vec<PlaybackEvent>>,
    pub session: Mutex<Vec<SessionEvent>>,
}

impl RecordingEmitter {
    pub fn playback_events(&self) -> Vec<PlaybackEvent> {
        self.playback.lock().clone()
    }

    pub fn session_events(&self) -> Vec<SessionEvent> {
        self.session.lock().clone()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        self.playback.lock().push(event);
    }

    fn emit_session(&self, event: SessionEvent) {
        self.session.lock().push(event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

/// A controller wired to recording collaborators and a temp download dir.
pub struct Harness {
    pub controller: Arc<PlaybackController>,
    pub store: Arc<QueueStore>,
    pub transport: Arc<RecordingTransport>,
    pub resolver: Arc<FakeResolver>,
    pub janitor: Arc<MediaJanitor>,
    pub emitter: Arc<RecordingEmitter>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ControllerSettings {
            max_queue_size: 10,
            duration_limit_secs: Some(7200),
            resolve_retry_delays_ms: vec![1, 1],
        })
    }

    pub fn with_settings(settings: ControllerSettings) -> Self {
        Self::build(settings, None)
    }

    pub fn with_probe(probe: Option<u64>) -> Self {
        Self::build(
            ControllerSettings {
                max_queue_size: 10,
                duration_limit_secs: Some(7200),
                resolve_retry_delays_ms: vec![1, 1],
            },
            probe,
        )
    }

    fn build(settings: ControllerSettings, probe: Option<u64>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let transport = RecordingTransport::new();
        let resolver = FakeResolver::new(dir.path());
        let janitor = Arc::new(MediaJanitor::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let store = Arc::new(QueueStore::new());
        let controller = Arc::new(PlaybackController::new(
            Arc::clone(&store),
            transport.clone(),
            resolver.clone(),
            Arc::new(FixedProbe(probe)),
            Arc::clone(&janitor),
            emitter.clone(),
            settings,
        ));
        Self {
            controller,
            store,
            transport,
            resolver,
            janitor,
            emitter,
            dir,
        }
    }

    pub fn user() -> UserRef {
        UserRef::new(42, "ana")
    }
}
