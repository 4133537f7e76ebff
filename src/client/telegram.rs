//! Adapters from `teloxide` types to the plain-data client types.
//!
//! A protocol client built on teloxide's type model can hand its messages to
//! the flows through these conversions.

use super::{BotMessage, Button, ButtonKind};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardButtonKind, InlineKeyboardMarkup, Message};

impl From<&InlineKeyboardButton> for Button {
    fn from(button: &InlineKeyboardButton) -> Self {
        let kind = match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => ButtonKind::Callback(data.clone()),
            InlineKeyboardButtonKind::Url(url) => ButtonKind::Url(url.to_string()),
            _ => ButtonKind::Other,
        };
        Self {
            label: button.text.clone(),
            kind,
        }
    }
}

/// Convert an inline keyboard into a row-major button grid.
#[must_use]
pub fn button_grid(markup: &InlineKeyboardMarkup) -> Vec<Vec<Button>> {
    markup
        .inline_keyboard
        .iter()
        .map(|row| row.iter().map(Button::from).collect())
        .collect()
}

impl From<&Message> for BotMessage {
    fn from(msg: &Message) -> Self {
        // Channel posts have no user sender; attribute them to the chat.
        let author_id = msg
            .from
            .as_ref()
            .map_or(msg.chat.id.0, |u| u.id.0.cast_signed());
        let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();

        Self {
            id: msg.id.0,
            author_id,
            has_media: msg.video().is_some() || msg.document().is_some(),
            buttons: msg.reply_markup().map(button_grid).unwrap_or_default(),
            text: text.to_string(),
        }
    }
}
