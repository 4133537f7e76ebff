//! Search-and-pick flows
//!
//! A flow turns a title into "the bot has answered with the picked item".
//! Two strategies exist: typing the title and pressing the first result
//! button, or running an inline query and picking its first result.

use crate::buttons::{self, ButtonMatch};
use crate::client::{ClientError, MessageId};
use crate::context::RunContext;
use crate::error::{escalate_click, RunError};
use crate::polling::{wait_for_message, PollOutcome, Wanted};
use crate::utils::retry_client_read;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Why a search did not produce a picked result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFailure {
    /// No results message with buttons arrived in time
    TimeoutResults,
    /// The results message had an empty first row
    NoResultsButtons,
    /// The bot did not answer the pick in time
    TimeoutAfterPick,
    /// The inline query returned nothing
    NoInlineResults,
    /// The bot did not answer the inline pick in time
    TimeoutAfterInlinePick,
    /// Pressing the result failed
    ClickFailed,
    /// A stop was requested
    Stopped,
}

impl SearchFailure {
    /// Reason code for logs and status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeoutResults => "timeout_results",
            Self::NoResultsButtons => "no_results_buttons",
            Self::TimeoutAfterPick => "timeout_after_pick",
            Self::NoInlineResults => "no_inline_results",
            Self::TimeoutAfterInlinePick => "timeout_after_inline_pick",
            Self::ClickFailed => "click_failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedResult {
    /// The results message (button flow only)
    pub results_message_id: Option<MessageId>,
    /// Label of the picked button or inline result
    pub picked_label: String,
    /// First bot message after the pick
    pub next_message_id: MessageId,
}

/// Outcome of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The first result was picked and the bot answered
    Picked(PickedResult),
    /// The search ended without a pick
    Failed(SearchFailure),
}

/// Strategy that looks a title up and picks its first result
#[async_trait]
pub trait SearchFlow: Send + Sync {
    /// Search for `title` and pick the first result.
    ///
    /// # Errors
    ///
    /// Rate limits and client failures outside the pick step.
    async fn search(&self, ctx: &RunContext<'_>, title: &str) -> Result<SearchOutcome, RunError>;
}

/// Which search strategy a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Send the title as text and press the first result button
    #[default]
    Buttons,
    /// Inline query, pick the first result
    Inline,
}

impl SearchMode {
    /// Strategy implementing this mode
    #[must_use]
    pub fn flow(self) -> Box<dyn SearchFlow> {
        match self {
            Self::Buttons => Box::new(ButtonSearch),
            Self::Inline => Box::new(InlineSearch),
        }
    }
}

/// Text search answered with a results keyboard
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonSearch;

#[async_trait]
impl SearchFlow for ButtonSearch {
    async fn search(&self, ctx: &RunContext<'_>, title: &str) -> Result<SearchOutcome, RunError> {
        let query = format!("{}{}", ctx.settings.search_send_prefix, title);
        let sent = ctx.client.send_text(ctx.peer, &query).await?;
        debug!("Sent search query msg_id={}", sent.id);

        let results = match wait_for_message(
            ctx,
            sent.id,
            Wanted::WithButtons,
            ctx.settings.search_results_timeout(),
        )
        .await?
        {
            PollOutcome::Found(message) => message,
            PollOutcome::TimedOut => return Ok(SearchOutcome::Failed(SearchFailure::TimeoutResults)),
            PollOutcome::Stopped => return Ok(SearchOutcome::Failed(SearchFailure::Stopped)),
        };

        let Some(first) = results.buttons.first().and_then(|row| row.first()) else {
            return Ok(SearchOutcome::Failed(SearchFailure::NoResultsButtons));
        };
        let target = ButtonMatch {
            button: first,
            row: 0,
            col: 0,
        };
        if let Err(e) = buttons::click(ctx.client, ctx.peer, &results, &target).await {
            let e = escalate_click(e)?;
            warn!("Picking the first result failed: {}", e);
            return Ok(SearchOutcome::Failed(SearchFailure::ClickFailed));
        }
        info!("Picked result '{}' on msg_id={}", first.label, results.id);

        match wait_for_message(ctx, results.id, Wanted::Any, ctx.settings.after_pick_timeout())
            .await?
        {
            PollOutcome::Found(next) => Ok(SearchOutcome::Picked(PickedResult {
                results_message_id: Some(results.id),
                picked_label: first.label.clone(),
                next_message_id: next.id,
            })),
            PollOutcome::TimedOut => Ok(SearchOutcome::Failed(SearchFailure::TimeoutAfterPick)),
            PollOutcome::Stopped => Ok(SearchOutcome::Failed(SearchFailure::Stopped)),
        }
    }
}

/// Inline query search
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSearch;

#[async_trait]
impl SearchFlow for InlineSearch {
    async fn search(&self, ctx: &RunContext<'_>, title: &str) -> Result<SearchOutcome, RunError> {
        let latest = retry_client_read(|| ctx.client.recent_messages(ctx.peer, 1)).await?;
        let floor = latest.first().map_or(0, |m| m.id);

        let results = ctx.client.inline_query(ctx.peer, title).await?;
        let Some(first) = results.first() else {
            return Ok(SearchOutcome::Failed(SearchFailure::NoInlineResults));
        };

        match ctx.client.pick_inline_result(ctx.peer, first).await {
            Ok(()) => info!("Picked inline result '{}'", first.display_text()),
            Err(ClientError::RateLimited { wait_secs }) => {
                return Err(RunError::RateLimited { wait_secs });
            }
            Err(e) => {
                warn!("Picking inline result {} failed: {}", first.result_id, e);
                return Ok(SearchOutcome::Failed(SearchFailure::ClickFailed));
            }
        }

        match wait_for_message(ctx, floor, Wanted::Any, ctx.settings.inline_pick_timeout()).await? {
            PollOutcome::Found(next) => Ok(SearchOutcome::Picked(PickedResult {
                results_message_id: None,
                picked_label: first.display_text(),
                next_message_id: next.id,
            })),
            PollOutcome::TimedOut => {
                Ok(SearchOutcome::Failed(SearchFailure::TimeoutAfterInlinePick))
            }
            PollOutcome::Stopped => Ok(SearchOutcome::Failed(SearchFailure::Stopped)),
        }
    }
}
