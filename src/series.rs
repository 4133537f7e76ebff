//! Walking a series through its NEXT chain
//!
//! Traversal is an explicit state machine:
//!
//! ```text
//! Locating -> Forwarding -> AwaitingNext -> Forwarding -> ... -> Ended
//! ```
//!
//! Every media item is anchored in the persisted state before its forward
//! decision, so a restart resumes at the item that was in flight.

use crate::buttons::{self, find_button, is_clickable};
use crate::client::{BotMessage, MessageId};
use crate::config::START_SCAN_LIMIT;
use crate::context::RunContext;
use crate::error::{escalate_click, RunError};
use crate::media::{deliver, Delivery};
use crate::polling::{earliest_match, wait_for_message, PollOutcome, Wanted};
use crate::state::RunState;
use crate::utils::retry_client_read;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Why a traversal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesEnd {
    /// Neither the start message nor anything after it carries media
    StartNotMedia,
    /// The current item has no clickable next button
    NoNextButton,
    /// Pressing next never produced new media
    TimeoutNoNewMedia,
    /// A stop was requested
    Stopped,
}

impl SeriesEnd {
    /// Reason code for logs and status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartNotMedia => "start_message_not_media",
            Self::NoNextButton => "end_no_next_button",
            Self::TimeoutNoNewMedia => "end_timeout_no_new_media",
            Self::Stopped => "stopped",
        }
    }
}

/// Result of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesOutcome {
    /// Why it ended
    pub end: SeriesEnd,
    /// Items forwarded by this traversal
    pub sent_total: u64,
    /// Last item visited, or the requested start
    pub last_message_id: MessageId,
}

impl SeriesOutcome {
    /// `false` only when no start item was found
    #[must_use]
    pub fn ok(&self) -> bool {
        self.end != SeriesEnd::StartNotMedia
    }
}

enum Stage {
    Locating,
    Forwarding(BotMessage),
    AwaitingNext(BotMessage),
    Ended(SeriesEnd),
}

/// Forward every item from `start_id` until the NEXT chain ends.
///
/// # Errors
///
/// Rate limits, client failures while locating the start, and persistence
/// failures.
#[instrument(skip_all, fields(start_id = start_id))]
pub async fn run_series(
    ctx: &RunContext<'_>,
    state: &mut RunState,
    start_id: MessageId,
) -> Result<SeriesOutcome, RunError> {
    let mut sent_total = 0;
    let mut last_message_id = start_id;
    let mut stage = Stage::Locating;

    loop {
        stage = match stage {
            Stage::Locating => match locate_start(ctx, start_id).await? {
                Some(start) => Stage::Forwarding(start),
                None => Stage::Ended(SeriesEnd::StartNotMedia),
            },
            Stage::Forwarding(current) => {
                last_message_id = current.id;
                state.last_media_message_id = current.id;
                ctx.persist(state).await?;
                if deliver(ctx, state, &current).await? == Delivery::Sent {
                    sent_total += 1;
                }
                Stage::AwaitingNext(current)
            }
            Stage::AwaitingNext(current) => await_next(ctx, &current).await?,
            Stage::Ended(end) => {
                info!("Series ended: reason={} sent={}", end.as_str(), sent_total);
                return Ok(SeriesOutcome {
                    end,
                    sent_total,
                    last_message_id,
                });
            }
        };
    }
}

/// The message at `start_id` if it is bot media, else the earliest bot media
/// after it among the recent messages.
async fn locate_start(
    ctx: &RunContext<'_>,
    start_id: MessageId,
) -> Result<Option<BotMessage>, RunError> {
    let direct = retry_client_read(|| ctx.client.message_by_id(ctx.peer, start_id)).await?;
    if let Some(start) = direct.filter(|m| m.is_from(ctx.peer) && m.has_media) {
        return Ok(Some(start));
    }

    debug!("msg_id={} is not usable media, scanning recent messages", start_id);
    let recent =
        retry_client_read(|| ctx.client.recent_messages(ctx.peer, START_SCAN_LIMIT)).await?;
    Ok(earliest_match(recent, ctx.peer, start_id, Wanted::WithMedia))
}

async fn await_next(ctx: &RunContext<'_>, current: &BotMessage) -> Result<Stage, RunError> {
    let settings = ctx.settings;
    let Some(next) =
        find_button(current, &settings.button_next_text).filter(|m| is_clickable(m.button))
    else {
        return Ok(Stage::Ended(SeriesEnd::NoNextButton));
    };

    for attempt in 1..=settings.max_retries_next {
        if ctx.stop_requested() {
            return Ok(Stage::Ended(SeriesEnd::Stopped));
        }

        if let Err(e) = buttons::click(ctx.client, ctx.peer, current, &next).await {
            let e = escalate_click(e)?;
            warn!(
                "Next click {}/{} failed on msg_id={}: {}",
                attempt, settings.max_retries_next, current.id, e
            );
            continue;
        }
        info!("Clicked next on msg_id={}", current.id);

        tokio::select! {
            () = ctx.stop.cancelled() => return Ok(Stage::Ended(SeriesEnd::Stopped)),
            () = sleep(settings.after_click_delay()) => {}
        }

        match wait_for_message(ctx, current.id, Wanted::WithMedia, settings.next_media_timeout())
            .await?
        {
            PollOutcome::Found(media) => {
                info!("Received media msg_id={}", media.id);
                return Ok(Stage::Forwarding(media));
            }
            PollOutcome::TimedOut => debug!(
                "No new media after click {}/{}",
                attempt, settings.max_retries_next
            ),
            PollOutcome::Stopped => return Ok(Stage::Ended(SeriesEnd::Stopped)),
        }
    }

    Ok(Stage::Ended(SeriesEnd::TimeoutNoNewMedia))
}
