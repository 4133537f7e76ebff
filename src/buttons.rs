//! Inline keyboard helpers: label normalization, lookup and clicking.
//!
//! Bots decorate button labels with emoji, arrows and inconsistent casing, so
//! lookups compare normalized labels by substring rather than exact text.

// lazy_regex! validates patterns at compile time and stores them in statics
#![allow(clippy::non_std_lazy_statics)]

use crate::client::{BotMessage, Button, ButtonKind, ChatClient, ClientError, Peer};
use lazy_regex::lazy_regex;
use thiserror::Error;
use tracing::error;

/// Characters outside the conservative allow-list
static RE_DISALLOWED: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[^\w\s.,!?\\-]");

/// Runs of whitespace
static RE_SPACES: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\s+");

/// A located button and its position in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonMatch<'a> {
    /// The button itself
    pub button: &'a Button,
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
}

/// Errors raised while pressing a button
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClickError {
    /// The target does not carry callback data
    #[error("Button at row={row} col={col} is not a callback button")]
    NotClickable {
        /// Row index
        row: usize,
        /// Column index
        col: usize,
    },
    /// The peer asked us to slow down
    #[error("Rate limited by peer (wait: {wait_secs}s)")]
    RateLimited {
        /// Seconds to wait
        wait_secs: u64,
    },
    /// Any other client failure
    #[error("Click failed: {0}")]
    Client(ClientError),
}

impl From<ClientError> for ClickError {
    fn from(err: ClientError) -> Self {
        match err.rate_limit_wait() {
            Some(wait_secs) => Self::RateLimited { wait_secs },
            None => Self::Client(err),
        }
    }
}

/// Normalize text for fuzzy label comparison.
///
/// Lowercases, folds `ё` into `е`, strips everything except word characters,
/// whitespace and `. , ! ? \ -`, then collapses whitespace.
///
/// # Examples
///
/// ```
/// use autosend::buttons::normalize;
/// assert_eq!(normalize("  ▶ Вперёд  >> "), "вперед");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase().replace('ё', "е");
    let allowed = RE_DISALLOWED.replace_all(&lowered, "");
    RE_SPACES.replace_all(&allowed, " ").trim().to_string()
}

/// Find the first button (row-major) whose normalized label contains `needle`.
///
/// Returns `None` when the message has no buttons or the needle normalizes to
/// an empty string.
#[must_use]
pub fn find_button<'a>(message: &'a BotMessage, needle: &str) -> Option<ButtonMatch<'a>> {
    let target = normalize(needle);
    if target.is_empty() {
        return None;
    }

    message
        .buttons
        .iter()
        .enumerate()
        .flat_map(|(row, buttons)| {
            buttons
                .iter()
                .enumerate()
                .map(move |(col, button)| ButtonMatch { button, row, col })
        })
        .find(|m| normalize(&m.button.label).contains(&target))
}

/// Whether pressing the button sends a callback to the bot.
#[must_use]
pub fn is_clickable(button: &Button) -> bool {
    matches!(&button.kind, ButtonKind::Callback(data) if !data.is_empty())
}

/// Press a located button.
///
/// # Errors
///
/// `NotClickable` without touching the client when the target has no
/// callback data, `RateLimited` when the peer throttles us, `Client` for any
/// other failure (logged here with coordinates).
pub async fn click(
    client: &dyn ChatClient,
    peer: &Peer,
    message: &BotMessage,
    target: &ButtonMatch<'_>,
) -> Result<(), ClickError> {
    if !is_clickable(target.button) {
        return Err(ClickError::NotClickable {
            row: target.row,
            col: target.col,
        });
    }

    client
        .click(peer, message.id, target.row, target.col)
        .await
        .map_err(|e| {
            let err = ClickError::from(e);
            if let ClickError::Client(inner) = &err {
                error!(
                    "Failed to click button at row={} col={} on msg_id={}: {}",
                    target.row, target.col, message.id, inner
                );
            }
            err
        })
}
