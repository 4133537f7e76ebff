//! Collaborators shared by every step of a run.

use crate::client::{ChatClient, Peer};
use crate::config::Settings;
use crate::state::{RunState, StateError, StateStore};
use tokio_util::sync::CancellationToken;

/// Borrowed bundle handed to the search, traversal and runner steps.
///
/// The run state itself is passed separately as `&mut RunState` so that the
/// single writer is visible in every signature.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    /// Protocol client
    pub client: &'a dyn ChatClient,
    /// The bot being driven
    pub peer: &'a Peer,
    /// Run settings
    pub settings: &'a Settings,
    /// Where state is persisted
    pub store: &'a StateStore,
    /// Cooperative stop signal
    pub stop: &'a CancellationToken,
}

impl RunContext<'_> {
    /// Persist the state
    ///
    /// # Errors
    ///
    /// Propagates any persistence failure.
    pub async fn persist(&self, state: &mut RunState) -> Result<(), StateError> {
        self.store.save(state).await
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }
}
