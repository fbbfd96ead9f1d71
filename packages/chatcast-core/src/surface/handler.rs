//! Chat command and button handling.
//!
//! Turns parsed [`Command`]s and [`CallbackAction`]s into playback controller
//! calls and renders every outcome, failures included, as reply text.

use std::sync::Arc;

use super::commands::{CallbackAction, Command};
use super::render::{
    has_next_page, help_text, now_playing_text, page_count, player_keyboard, queue_keyboard,
    queue_text, start_text,
};
use super::{CallbackReply, MessageEdit, Reply};
use crate::error::PlaybackError;
use crate::services::{ChannelSnapshot, EnqueueResult, Outcome, PlaybackController};
use crate::types::{ChannelId, UserRef};

const NO_SESSION_ALERT: &str = "No active music session!";
const QUEUE_FINISHED: &str = "✅ Queue finished. Left the voice chat.";

/// Maps chat commands and button presses onto the playback controller.
///
/// Every failure is rendered as reply text; nothing here returns an error.
pub struct CommandSurface {
    controller: Arc<PlaybackController>,
    prefix: String,
    page_size: usize,
}

impl CommandSurface {
    pub fn new(controller: Arc<PlaybackController>, prefix: impl Into<String>, page_size: usize) -> Self {
        Self {
            controller,
            prefix: prefix.into(),
            page_size: page_size.max(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parses and handles raw chat text. Returns `None` for text that is not a command.
    pub async fn handle_text(&self, channel: ChannelId, user: UserRef, text: &str) -> Option<Reply> {
        let command = Command::parse(&self.prefix, text)?;
        Some(self.handle_command(channel, user, command).await)
    }

    pub async fn handle_command(&self, channel: ChannelId, user: UserRef, command: Command) -> Reply {
        log::debug!(
            "[CommandSurface] {:?} from {} in {}",
            command,
            user.name,
            channel
        );

        match command {
            Command::Play(query) => self.play(channel, user, &query, false).await,
            Command::PlayForce(query) => self.play(channel, user, &query, true).await,
            Command::Stream(url) => self.stream(channel, user, &url).await,
            Command::Pause => match self.controller.pause(channel).await {
                Ok(()) => Reply::text("⏸ Paused the current song."),
                Err(PlaybackError::NotPlaying) => Reply::text("❌ Nothing is playing to pause."),
                Err(e) => error_reply(&e),
            },
            Command::Resume => match self.controller.resume(channel).await {
                Ok(()) => Reply::text("▶️ Resumed the current song."),
                Err(PlaybackError::NotPlaying | PlaybackError::NotPaused) => {
                    Reply::text("❌ Nothing is paused to resume.")
                }
                Err(e) => error_reply(&e),
            },
            Command::Skip => match self.controller.skip(channel).await {
                Ok(outcome) => {
                    let next = match outcome {
                        Outcome::Started(request) => {
                            return Reply::with_keyboard(
                                format!(
                                    "⏭ Skipped the current song.\n\n{}",
                                    now_playing_text(&request)
                                ),
                                player_keyboard(false),
                            );
                        }
                        Outcome::Idle => format!("\n\n{QUEUE_FINISHED}"),
                        _ => String::new(),
                    };
                    Reply::text(format!("⏭ Skipped the current song.{next}"))
                }
                Err(PlaybackError::NotPlaying) => Reply::text("❌ Nothing is playing to skip."),
                Err(e) => error_reply(&e),
            },
            Command::Stop => {
                let result = self.controller.stop(channel).await;
                if result.cleared == 0 {
                    Reply::text("❌ Nothing is playing to stop.")
                } else {
                    Reply::text("⏹ Stopped playing and cleared the queue.")
                }
            }
            Command::Queue(page) => match self.controller.snapshot(channel).await {
                Some(snapshot) => self.queue_reply(&snapshot, page.map_or(0, |p| p - 1)),
                None => Reply::text("❌ No active music session found."),
            },
            Command::Now => match self.now_playing(channel).await {
                Some(reply) => reply,
                None => Reply::text("❌ Nothing is playing right now."),
            },
            Command::Help => Reply::text(help_text(&self.prefix)),
            Command::Start => Reply::text(start_text(&self.prefix)),
        }
    }

    pub async fn handle_callback(
        &self,
        channel: ChannelId,
        user: UserRef,
        action: CallbackAction,
    ) -> CallbackReply {
        log::debug!(
            "[CommandSurface] Callback {:?} from {} in {}",
            action,
            user.name,
            channel
        );

        let snapshot = self.controller.snapshot(channel).await;
        let has_current = snapshot.as_ref().is_some_and(|s| s.current.is_some());

        match action {
            CallbackAction::Previous => {
                CallbackReply::alert("Previous song function not implemented yet")
            }
            CallbackAction::QueuePage(page) => match snapshot {
                Some(snapshot) => {
                    let reply = self.queue_reply(&snapshot, page);
                    CallbackReply::notice(
                        format!("Page {}", page + 1),
                        Some(MessageEdit::Text(reply)),
                    )
                }
                None => CallbackReply::alert(NO_SESSION_ALERT),
            },
            _ if !has_current => CallbackReply::alert(NO_SESSION_ALERT),
            CallbackAction::Pause => match self.controller.pause(channel).await {
                Ok(()) => CallbackReply::notice(
                    "Paused the music",
                    Some(MessageEdit::Markup(player_keyboard(true))),
                ),
                Err(e) => error_alert(&e),
            },
            CallbackAction::Resume => match self.controller.resume(channel).await {
                Ok(()) => CallbackReply::notice(
                    "Resumed the music",
                    Some(MessageEdit::Markup(player_keyboard(false))),
                ),
                Err(e) => error_alert(&e),
            },
            CallbackAction::Skip => match self.controller.skip(channel).await {
                Ok(Outcome::Started(request)) => CallbackReply::notice(
                    "Skipped to the next song",
                    Some(MessageEdit::Text(Reply::with_keyboard(
                        now_playing_text(&request),
                        player_keyboard(false),
                    ))),
                ),
                Ok(_) => CallbackReply::notice(
                    "Skipped to the next song",
                    Some(MessageEdit::Text(Reply::text(QUEUE_FINISHED))),
                ),
                Err(e) => error_alert(&e),
            },
            CallbackAction::Stop => {
                self.controller.stop(channel).await;
                CallbackReply::notice(
                    "Stopped the music",
                    Some(MessageEdit::Text(Reply::text(
                        "⏹ Music playback stopped and queue cleared.",
                    ))),
                )
            }
            CallbackAction::Refresh => self.back_to_player(channel, "Refreshed player information").await,
            CallbackAction::QueueBack => self.back_to_player(channel, "Back to player").await,
        }
    }

    async fn play(&self, channel: ChannelId, user: UserRef, query: &str, front: bool) -> Reply {
        if query.trim().is_empty() {
            return Reply::text(format!(
                "❌ Please provide a song name or YouTube URL.\nExample: `{}play despacito`",
                self.prefix
            ));
        }
        let result = self
            .controller
            .enqueue_query(channel, channel, query, user, front)
            .await;
        self.enqueue_reply(result)
    }

    async fn stream(&self, channel: ChannelId, user: UserRef, url: &str) -> Reply {
        let result = self
            .controller
            .enqueue_stream_url(channel, channel, url, None, user, false)
            .await;
        match result {
            Err(PlaybackError::InvalidRequest(_)) => Reply::text(format!(
                "❌ Please provide a stream URL.\nExample: `{}stream https://example.com/live.mp3`",
                self.prefix
            )),
            other => self.enqueue_reply(other),
        }
    }

    fn enqueue_reply(&self, result: Result<EnqueueResult, PlaybackError>) -> Reply {
        match result {
            Ok(res) if res.now_playing => {
                Reply::with_keyboard(now_playing_text(&res.request), player_keyboard(false))
            }
            Ok(res) => Reply::text(format!(
                "✅ **{}** added to queue at position {}.",
                res.request.title, res.position
            )),
            Err(e) => error_reply(&e),
        }
    }

    fn queue_reply(&self, snapshot: &ChannelSnapshot, page: usize) -> Reply {
        let len = snapshot.queue.len();
        let page = page.min(page_count(len, self.page_size) - 1);
        let text = queue_text(snapshot, page, self.page_size);
        if len > self.page_size {
            let keyboard = queue_keyboard(page, has_next_page(len, page, self.page_size));
            Reply::with_keyboard(text, keyboard)
        } else {
            Reply::text(text)
        }
    }

    async fn now_playing(&self, channel: ChannelId) -> Option<Reply> {
        let snapshot = self.controller.snapshot(channel).await?;
        let current = snapshot.current.as_ref()?;
        Some(Reply::with_keyboard(
            now_playing_text(current),
            player_keyboard(snapshot.is_paused),
        ))
    }

    async fn back_to_player(&self, channel: ChannelId, answer: &str) -> CallbackReply {
        match self.now_playing(channel).await {
            Some(reply) => CallbackReply::notice(answer, Some(MessageEdit::Text(reply))),
            None => CallbackReply::alert(NO_SESSION_ALERT),
        }
    }
}

/// Chat text for a failed operation.
fn error_reply(error: &PlaybackError) -> Reply {
    let text = match error {
        PlaybackError::Resolution(_) => {
            "❌ Failed to download the song. Please try another one.".to_string()
        }
        PlaybackError::TransportJoin(_) => {
            "❌ No active voice chat found. Please start a voice chat first!".to_string()
        }
        PlaybackError::QueueFull { max } => format!("❌ Maximum queue size ({max}) reached."),
        PlaybackError::DurationLimitExceeded { limit_minutes } => {
            format!("❌ Songs longer than {limit_minutes} minutes are not allowed.")
        }
        PlaybackError::ResourceMissing(_) | PlaybackError::TransportStream(_) => {
            "❌ Failed to play the song.".to_string()
        }
        PlaybackError::Stopped => {
            "⏹ Playback was stopped before the song could start.".to_string()
        }
        other => format!("❌ Error: {other}"),
    };
    Reply::text(text)
}

fn error_alert(error: &PlaybackError) -> CallbackReply {
    CallbackReply::alert(format!("Error: {error}"))
}
