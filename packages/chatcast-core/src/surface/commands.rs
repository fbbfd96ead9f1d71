//! Chat command and callback parsing.

use serde::{Deserialize, Serialize};

/// A prefixed chat command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "argument", rename_all = "camelCase")]
pub enum Command {
    /// Appends a resolved query. The query may be empty; the handler rejects it.
    Play(String),
    /// Inserts a resolved query at the head of the queue.
    PlayForce(String),
    /// Appends a live URL stream.
    Stream(String),
    Pause,
    Resume,
    Skip,
    Stop,
    /// Shows the queue; the page is 1-based as typed by the user.
    Queue(Option<usize>),
    Now,
    Help,
    Start,
}

impl Command {
    /// Parses `text` if it starts with `prefix` followed by a known command.
    ///
    /// Command names are case-insensitive and may carry a `@botname` suffix.
    pub fn parse(prefix: &str, text: &str) -> Option<Self> {
        let body = text.trim_start().strip_prefix(prefix)?;
        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        let command = match name.as_str() {
            "play" => Self::Play(rest.to_string()),
            "playforce" => Self::PlayForce(rest.to_string()),
            "stream" => Self::Stream(rest.to_string()),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            "queue" => Self::Queue(rest.parse().ok().filter(|p| *p > 0)),
            "now" => Self::Now,
            "help" => Self::Help,
            "start" => Self::Start,
            _ => return None,
        };
        Some(command)
    }
}

/// Inline button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "page", rename_all = "camelCase")]
pub enum CallbackAction {
    Pause,
    Resume,
    Skip,
    Stop,
    Refresh,
    /// Shows a 0-based queue page.
    QueuePage(usize),
    QueueBack,
    Previous,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data.trim() {
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            "refresh" => Self::Refresh,
            "queue_back" => Self::QueueBack,
            "previous" => Self::Previous,
            other => {
                let page = other.strip_prefix("queue_page:")?;
                Self::QueuePage(page.parse().ok()?)
            }
        };
        Some(action)
    }
}
