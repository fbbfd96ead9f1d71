//! Transport event processing service.
//!
//! Responsibilities:
//! - Consuming `TransportEvent`s reported by the streaming transport
//! - Advancing the affected channel's queue

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::playback_controller::{Outcome, PlaybackController};
use crate::transport::TransportEvent;

/// Feeds stream-end notifications into the playback controller.
pub struct StreamEndProcessor {
    controller: Arc<PlaybackController>,
    event_rx: Arc<Mutex<Option<mpsc::Receiver<TransportEvent>>>>,
    spawner: TokioSpawner,
}

impl StreamEndProcessor {
    pub fn new(
        controller: Arc<PlaybackController>,
        event_rx: mpsc::Receiver<TransportEvent>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            controller,
            event_rx: Arc::new(Mutex::new(Some(event_rx))),
            spawner,
        }
    }

    /// Handles one transport event.
    pub async fn process(controller: &PlaybackController, event: TransportEvent) -> Outcome {
        match event {
            TransportEvent::StreamEnded {
                channel,
                generation,
            } => match controller.advance(channel, Some(generation)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!(
                        "[StreamEndProcessor] Advance failed in {}: {}",
                        channel,
                        e
                    );
                    Outcome::Stale
                }
            },
        }
    }

    /// Spawns the pump that drains the event receiver until `token` is cancelled.
    ///
    /// Each event is handled on its own task so one channel's lazy resolution
    /// never delays another channel. Calling this twice is a no-op.
    pub fn start(&self, token: CancellationToken) {
        let Some(mut rx) = self.event_rx.lock().take() else {
            log::warn!("[StreamEndProcessor] Already started");
            return;
        };
        let controller = Arc::clone(&self.controller);
        let spawner = self.spawner.clone();

        self.spawner.spawn_cancellable(token, async move {
            while let Some(event) = rx.recv().await {
                log::debug!("[StreamEndProcessor] {:?}", event);
                let controller = Arc::clone(&controller);
                spawner.spawn(async move {
                    Self::process(&controller, event).await;
                });
            }
            log::info!("[StreamEndProcessor] Event channel closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use crate::types::ChannelId;
    use std::time::Duration;

    const CHAT: ChannelId = ChannelId(7);

    #[tokio::test]
    async fn stream_end_event_advances_queue() {
        let h = Harness::new();
        for q in ["a", "b"] {
            h.resolver.found(q, Some(60));
            h.controller
                .enqueue_query(CHAT, CHAT, q, Harness::user(), false)
                .await
                .unwrap();
        }
        let generation = h.controller.snapshot(CHAT).await.unwrap().generation;

        let (tx, rx) = mpsc::channel(8);
        let processor =
            StreamEndProcessor::new(Arc::clone(&h.controller), rx, TokioSpawner::current());
        let token = CancellationToken::new();
        processor.start(token.clone());

        tx.send(TransportEvent::StreamEnded {
            channel: CHAT,
            generation,
        })
        .await
        .unwrap();

        let mut current = None;
        for _ in 0..200 {
            let snap = h.controller.snapshot(CHAT).await.unwrap();
            if snap.generation != generation {
                current = snap.current.map(|r| r.title);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(current.as_deref(), Some("B"));
        token.cancel();
    }

    #[tokio::test]
    async fn stale_event_is_ignored() {
        let h = Harness::new();
        h.resolver.found("a", Some(60));
        h.controller
            .enqueue_query(CHAT, CHAT, "a", Harness::user(), false)
            .await
            .unwrap();

        let outcome = StreamEndProcessor::process(
            &h.controller,
            TransportEvent::StreamEnded {
                channel: CHAT,
                generation: 999,
            },
        )
        .await;
        assert!(matches!(outcome, Outcome::Stale));
        assert!(h.controller.snapshot(CHAT).await.unwrap().is_playing);
    }
}
