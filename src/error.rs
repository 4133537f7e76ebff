//! Errors that end a run.
//!
//! Expected outcomes such as timeouts or a missing next button are not errors;
//! they are reason codes on the search and traversal outcomes.

use crate::buttons::ClickError;
use crate::client::ClientError;
use crate::config::SettingsError;
use crate::state::StateError;
use thiserror::Error;

/// A failure that aborts the current run
#[derive(Debug, Error)]
pub enum RunError {
    /// The peer throttled us; the caller decides how long to back off
    #[error("Rate limited by peer (wait: {wait_secs}s)")]
    RateLimited {
        /// Seconds the peer asked us to wait
        wait_secs: u64,
    },
    /// The run cannot start (missing settings, unauthorized session)
    #[error("Precondition failed: {0}")]
    Precondition(&'static str),
    /// Client failure outside the recoverable steps
    #[error("Client error: {0}")]
    Client(ClientError),
    /// State could not be persisted or loaded
    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl RunError {
    /// Short machine-readable code for status reporting
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Precondition(code) => *code,
            Self::Client(ClientError::Unauthorized) => "not_authorized",
            Self::Client(_) => "client_error",
            Self::State(_) => "state_error",
        }
    }
}

impl From<ClientError> for RunError {
    fn from(err: ClientError) -> Self {
        match err.rate_limit_wait() {
            Some(wait_secs) => Self::RateLimited { wait_secs },
            None => Self::Client(err),
        }
    }
}

impl From<SettingsError> for RunError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Missing("TARGET_CHAT_ID") => Self::Precondition("missing_target_chat_id"),
            SettingsError::Missing(_) | SettingsError::Invalid { .. } => {
                Self::Precondition("invalid_settings")
            }
        }
    }
}

/// Split a click failure into "abort the run" and "this step failed".
///
/// Rate limits abort; everything else is returned for the caller to log and
/// treat as a failed attempt.
pub(crate) fn escalate_click(err: ClickError) -> Result<ClickError, RunError> {
    match err {
        ClickError::RateLimited { wait_secs } => Err(RunError::RateLimited { wait_secs }),
        other => Ok(other),
    }
}
