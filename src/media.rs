//! Delivering media items to the destination chat

use crate::client::{BotMessage, ClientError};
use crate::context::RunContext;
use crate::error::RunError;
use crate::state::RunState;
use tracing::{debug, error, info};

/// What happened to one media item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Forwarded now and recorded in the ledger
    Sent,
    /// Already in the ledger, nothing was sent
    AlreadySent,
    /// The forward failed and was logged
    Failed,
}

/// Forward `message` unless the ledger already has it.
///
/// Makes exactly one forward call per invocation. Only a confirmed forward
/// touches the ledger and counters, after which the state is persisted.
///
/// # Errors
///
/// `RunError::RateLimited` when the peer throttles the forward, or a
/// persistence failure.
pub async fn deliver(
    ctx: &RunContext<'_>,
    state: &mut RunState,
    message: &BotMessage,
) -> Result<Delivery, RunError> {
    if state.has_sent(message.id) {
        debug!("msg_id={} already forwarded, skipping", message.id);
        return Ok(Delivery::AlreadySent);
    }

    let settings = ctx.settings;
    match ctx
        .client
        .forward(
            ctx.peer,
            message.id,
            &settings.target_chat_id,
            settings.forward_mode,
        )
        .await
    {
        Ok(()) => {
            state.note_forwarded(message.id, settings.batch_size, settings.sent_dedup_limit);
            ctx.persist(state).await?;
            info!("Sent to target msg_id={}", message.id);
            Ok(Delivery::Sent)
        }
        Err(ClientError::RateLimited { wait_secs }) => Err(RunError::RateLimited { wait_secs }),
        Err(e) => {
            error!(
                "Failed to send msg_id={} to target={}: {}",
                message.id, settings.target_chat_id, e
            );
            Ok(Delivery::Failed)
        }
    }
}
