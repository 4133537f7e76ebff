//! Title queue orchestration
//!
//! Runs search and traversal for each queued title, persisting progress so a
//! restarted run continues at the first unfinished title, or inside it when a
//! resume anchor is recorded.

use crate::context::RunContext;
use crate::error::RunError;
use crate::polling::{wait_for_message, PollOutcome, Wanted};
use crate::search::{SearchFailure, SearchFlow, SearchOutcome};
use crate::series::{run_series, SeriesEnd};
use crate::state::{Phase, RunState};
use crate::utils::truncate_str;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// What a run achieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Titles whose traversal finished
    pub titles_completed: usize,
    /// Titles skipped after a failed search or a missing start item
    pub titles_failed: usize,
    /// Items forwarded during this run
    pub items_sent: u64,
    /// Whether the run ended on a stop request
    pub stopped: bool,
}

enum TitleOutcome {
    Done,
    Failed(&'static str),
    Stopped,
}

/// Process `titles` starting at `state.current_index`.
///
/// The phase is `running` while titles are processed and is persisted as
/// `idle` on every exit, including errors.
///
/// # Errors
///
/// Rate limits, client failures outside recoverable steps, and persistence
/// failures abort the run. A single title failing does not.
pub async fn run_titles(
    ctx: &RunContext<'_>,
    titles: &[String],
    state: &mut RunState,
    flow: &dyn SearchFlow,
) -> Result<RunSummary, RunError> {
    state.phase = Phase::Running;
    state.last_bot_chat.clone_from(&ctx.peer.handle);
    ctx.persist(state).await?;
    info!(
        "Run started: {} titles, resuming at index {}",
        titles.len(),
        state.current_index
    );

    let sent_before = state.sent_total;
    let result = process_titles(ctx, titles, state, flow).await;

    state.phase = Phase::Idle;
    let saved = ctx.persist(state).await;
    let mut summary = result?;
    saved?;

    summary.items_sent = state.sent_total.saturating_sub(sent_before);
    info!(
        "Run finished: completed={} failed={} sent={} stopped={}",
        summary.titles_completed, summary.titles_failed, summary.items_sent, summary.stopped
    );
    Ok(summary)
}

async fn process_titles(
    ctx: &RunContext<'_>,
    titles: &[String],
    state: &mut RunState,
    flow: &dyn SearchFlow,
) -> Result<RunSummary, RunError> {
    let mut summary = RunSummary::default();
    let delay = ctx.settings.title_delay();

    for (index, title) in titles.iter().enumerate().skip(state.current_index) {
        if ctx.stop_requested() {
            info!("Stop requested before title index={}", index);
            return stopping(ctx, state, summary).await;
        }

        match process_title(ctx, state, index, title, flow).await? {
            TitleOutcome::Done => summary.titles_completed += 1,
            TitleOutcome::Failed(reason) => {
                info!("Skipping '{}': reason={}", title, reason);
                summary.titles_failed += 1;
            }
            TitleOutcome::Stopped => return stopping(ctx, state, summary).await,
        }

        state.advance_past(index);
        ctx.persist(state).await?;

        if !delay.is_zero() && index + 1 < titles.len() {
            tokio::select! {
                () = ctx.stop.cancelled() => {
                    info!("Stop requested during delay");
                    return stopping(ctx, state, summary).await;
                }
                () = sleep(delay) => {}
            }
        }
    }

    Ok(summary)
}

async fn stopping(
    ctx: &RunContext<'_>,
    state: &mut RunState,
    mut summary: RunSummary,
) -> Result<RunSummary, RunError> {
    state.phase = Phase::Stopping;
    ctx.persist(state).await?;
    summary.stopped = true;
    Ok(summary)
}

#[instrument(skip(ctx, state, flow))]
async fn process_title(
    ctx: &RunContext<'_>,
    state: &mut RunState,
    index: usize,
    title: &str,
    flow: &dyn SearchFlow,
) -> Result<TitleOutcome, RunError> {
    let start_id = if let Some(anchor) = state.resume_anchor(title) {
        info!("Resuming '{}' from msg_id={}", title, anchor);
        anchor
    } else {
        state.last_title = title.to_string();
        state.last_media_message_id = 0;
        ctx.persist(state).await?;

        let picked = match flow.search(ctx, title).await? {
            SearchOutcome::Picked(picked) => picked,
            SearchOutcome::Failed(SearchFailure::Stopped) => return Ok(TitleOutcome::Stopped),
            SearchOutcome::Failed(reason) => return Ok(TitleOutcome::Failed(reason.as_str())),
        };
        info!(
            "Picked '{}' for '{}'",
            truncate_str(&picked.picked_label, 64),
            title
        );

        match wait_for_message(
            ctx,
            picked.next_message_id - 1,
            Wanted::WithMedia,
            ctx.settings.next_media_timeout(),
        )
        .await?
        {
            PollOutcome::Found(first) => {
                state.last_media_message_id = first.id;
                ctx.persist(state).await?;
                first.id
            }
            PollOutcome::TimedOut => return Ok(TitleOutcome::Failed("no_media_after_pick")),
            PollOutcome::Stopped => return Ok(TitleOutcome::Stopped),
        }
    };

    let outcome = run_series(ctx, state, start_id).await?;
    match outcome.end {
        SeriesEnd::Stopped => Ok(TitleOutcome::Stopped),
        SeriesEnd::StartNotMedia => {
            warn!("No media found from msg_id={}", start_id);
            Ok(TitleOutcome::Failed(outcome.end.as_str()))
        }
        SeriesEnd::NoNextButton | SeriesEnd::TimeoutNoNewMedia => Ok(TitleOutcome::Done),
    }
}
