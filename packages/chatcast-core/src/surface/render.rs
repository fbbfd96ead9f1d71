//! Chat-facing text and inline keyboards.

use serde::Serialize;

use crate::media::TrackDuration;
use crate::services::ChannelSnapshot;
use crate::types::{Request, StreamKind};

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    fn new(text: &str, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of buttons.
pub type Keyboard = Vec<Vec<Button>>;

/// Duration shown in the queue listing.
fn listing_duration(request: &Request) -> String {
    match (request.kind, request.duration) {
        (StreamKind::Live, TrackDuration::Unknown) => "URL stream".to_string(),
        (_, duration) => duration.to_string(),
    }
}

/// Text for the currently playing request.
pub fn now_playing_text(request: &Request) -> String {
    let mut text = String::from("🎵 **Now Playing**\n\n");
    text.push_str(&format!("🎧 **{}**\n", request.title));
    text.push_str(&format!(
        "👤 Uploader: {}\n",
        request.uploader.as_deref().unwrap_or("Unknown")
    ));
    text.push_str(&format!("⏱ Duration: {}\n", request.duration));
    if let Some(url) = &request.source_url {
        text.push_str(&format!("🔗 [Link to Video]({})\n", url));
    }
    text
}

/// Number of pages needed to show `len` pending items.
pub fn page_count(len: usize, per_page: usize) -> usize {
    len.div_ceil(per_page.max(1)).max(1)
}

/// Returns true if `page` (0-based) is followed by another page.
pub fn has_next_page(len: usize, page: usize, per_page: usize) -> bool {
    len > (page + 1) * per_page.max(1)
}

/// Text for one page (0-based) of a channel's queue.
pub fn queue_text(snapshot: &ChannelSnapshot, page: usize, per_page: usize) -> String {
    let per_page = per_page.max(1);
    let queue = &snapshot.queue;
    let mut text = String::from("🎵 **Music Queue**\n\n");

    match &snapshot.current {
        Some(current) => {
            text.push_str("**Now Playing:**\n");
            text.push_str(&format!("🎧 **{}**\n", current.title));
            text.push_str(&format!("⏱ Duration: {}\n\n", current.duration));
        }
        None => text.push_str("**Not playing anything currently**\n\n"),
    }

    if queue.is_empty() {
        text.push_str("**Queue is empty**\n");
    } else {
        text.push_str(&format!("**Queue:** {} song(s)\n", queue.len()));
        let start = page * per_page;
        for (i, request) in queue.iter().enumerate().skip(start).take(per_page) {
            text.push_str(&format!(
                "{}. {} ({})\n",
                i + 1,
                request.title,
                listing_duration(request)
            ));
        }
    }

    if queue.len() > per_page {
        text.push_str(&format!(
            "\nPage {}/{}",
            page + 1,
            page_count(queue.len(), per_page)
        ));
    }
    text
}

/// Player controls. The middle button toggles between pause and resume.
pub fn player_keyboard(paused: bool) -> Keyboard {
    let toggle = if paused {
        Button::new("▶️ Resume", "resume")
    } else {
        Button::new("⏸ Pause", "pause")
    };
    vec![
        vec![
            Button::new("⏪ Previous", "previous"),
            toggle,
            Button::new("⏭ Skip", "skip"),
        ],
        vec![
            Button::new("⏹ Stop", "stop"),
            Button::new("🔄 Refresh", "refresh"),
        ],
    ]
}

/// Queue navigation for a 0-based page.
pub fn queue_keyboard(page: usize, has_next: bool) -> Keyboard {
    let mut nav = Vec::new();
    if page > 0 {
        nav.push(Button::new("⬅️ Previous", format!("queue_page:{}", page - 1)));
    }
    if has_next {
        nav.push(Button::new("➡️ Next", format!("queue_page:{}", page + 1)));
    }

    let mut rows = Vec::new();
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(vec![Button::new("🔙 Back", "queue_back")]);
    rows
}

pub fn help_text(prefix: &str) -> String {
    let commands = [
        ("play [song name/YouTube URL]", "Play a song in voice chat"),
        ("playforce [song name/YouTube URL]", "Play a song next, ahead of the queue"),
        ("stream [URL]", "Stream a live URL in voice chat"),
        ("pause", "Pause the current song"),
        ("resume", "Resume the paused song"),
        ("skip", "Skip to the next song"),
        ("stop", "Stop playing and clear queue"),
        ("queue", "Show the current song queue"),
        ("now", "Show currently playing song"),
        ("help", "Show this help message"),
    ];

    let mut text = String::from("📋 **Available Commands:**\n\n");
    for (usage, description) in commands {
        text.push_str(&format!("`{prefix}{usage}` - {description}\n"));
    }
    text
}

pub fn start_text(prefix: &str) -> String {
    format!(
        "👋 **Hello! I'm a Music Bot for Telegram voice chats.**\n\n\
         Use `{prefix}help` to see available commands."
    )
}
