//! Platform-independent chat surface.
//!
//! Turns chat commands and inline button presses into controller calls and
//! renders the results as chat text. A chat platform adapter only has to
//! deliver text/callback data in and send [`Reply`]/[`CallbackReply`] out.

pub mod commands;
mod handler;
pub mod render;

pub use commands::{CallbackAction, Command};
pub use handler::CommandSurface;
pub use render::{Button, Keyboard};

use serde::Serialize;

/// A message to send to the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
    pub disable_web_page_preview: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            disable_web_page_preview: false,
        }
    }

    /// A reply with an inline keyboard and link previews disabled.
    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
            disable_web_page_preview: true,
        }
    }
}

/// Change to apply to the message that carried the pressed button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum MessageEdit {
    /// Replace only the keyboard.
    Markup(Keyboard),
    /// Replace text and keyboard.
    Text(Reply),
}

/// Answer to an inline button press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackReply {
    /// Short notification shown to the presser.
    pub answer: String,
    pub show_alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit: Option<MessageEdit>,
}

impl CallbackReply {
    pub fn notice(answer: impl Into<String>, edit: Option<MessageEdit>) -> Self {
        Self {
            answer: answer.into(),
            show_alert: false,
            edit,
        }
    }

    pub fn alert(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            show_alert: true,
            edit: None,
        }
    }
}
