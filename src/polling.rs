//! Bounded waits for bot replies
//!
//! The bot answers asynchronously, so every flow step that expects a reply
//! polls the most recent messages until a matching one shows up, the
//! deadline passes, or a stop is requested.

use crate::client::{BotMessage, ClientError, MessageId, Peer};
use crate::config::{POLL_FETCH_LIMIT, POLL_INTERVAL};
use crate::context::RunContext;
use crate::error::RunError;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// What kind of bot message a wait is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wanted {
    /// Any message from the bot
    Any,
    /// A message with an inline keyboard
    WithButtons,
    /// A message carrying a video or document
    WithMedia,
}

impl Wanted {
    fn matches(self, message: &BotMessage) -> bool {
        match self {
            Self::Any => true,
            Self::WithButtons => message.has_buttons(),
            Self::WithMedia => message.has_media,
        }
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A matching message arrived
    Found(BotMessage),
    /// The deadline passed
    TimedOut,
    /// A stop was requested while waiting
    Stopped,
}

/// Earliest bot message newer than `after_id` that satisfies `wanted`.
#[must_use]
pub fn earliest_match(
    messages: Vec<BotMessage>,
    peer: &Peer,
    after_id: MessageId,
    wanted: Wanted,
) -> Option<BotMessage> {
    messages
        .into_iter()
        .filter(|m| m.id > after_id && m.is_from(peer) && wanted.matches(m))
        .min_by_key(|m| m.id)
}

/// Wait until the bot posts a message newer than `after_id` matching `wanted`.
///
/// Transient fetch failures are logged and retried on the next tick. The
/// deadline is checked once per iteration, so a slow fetch may overrun it by
/// one call.
///
/// # Errors
///
/// Returns `RunError::RateLimited` if the peer throttles a fetch.
pub async fn wait_for_message(
    ctx: &RunContext<'_>,
    after_id: MessageId,
    wanted: Wanted,
    timeout: Duration,
) -> Result<PollOutcome, RunError> {
    let deadline = Instant::now() + timeout;

    loop {
        if ctx.stop_requested() {
            return Ok(PollOutcome::Stopped);
        }
        if Instant::now() >= deadline {
            debug!("Timed out waiting for {:?} after msg_id={}", wanted, after_id);
            return Ok(PollOutcome::TimedOut);
        }

        match ctx.client.recent_messages(ctx.peer, POLL_FETCH_LIMIT).await {
            Ok(messages) => {
                if let Some(found) = earliest_match(messages, ctx.peer, after_id, wanted) {
                    return Ok(PollOutcome::Found(found));
                }
            }
            Err(ClientError::RateLimited { wait_secs }) => {
                return Err(RunError::RateLimited { wait_secs });
            }
            Err(e) => warn!("Fetching recent messages failed, will retry: {}", e),
        }

        tokio::select! {
            () = ctx.stop.cancelled() => return Ok(PollOutcome::Stopped),
            () = sleep(POLL_INTERVAL) => {}
        }
    }
}
