//! Single-run control plane
//!
//! Owns the background task of the active run and its cancellation token.
//! `start` and `stop` are serialized by an async mutex, so at most one run is
//! active at a time.

use crate::client::{ChatClient, ClientError};
use crate::config::Settings;
use crate::context::RunContext;
use crate::error::RunError;
use crate::runner::{run_titles, RunSummary};
use crate::search::SearchMode;
use crate::state::{Phase, RunState, StateStore};
use crate::utils::retry_client_read;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Titles to queue
    pub titles: Vec<String>,
    /// Bot to drive
    pub bot_username: String,
    /// Search strategy
    pub mode: SearchMode,
    /// Replace the persisted queue instead of resuming it
    pub fresh: bool,
}

/// Snapshot of the manager for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    /// A run task is active
    pub running: bool,
    /// When the current or last run was started
    pub started_at: Option<DateTime<Utc>>,
    /// Error code of the last failed run
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Slot {
    task: Option<JoinHandle<()>>,
    stop: Option<CancellationToken>,
    started_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

struct Shared {
    client: Arc<dyn ChatClient>,
    settings: Arc<Settings>,
    store: StateStore,
    last_error: RwLock<Option<String>>,
}

/// Starts, stops and reports on the single active run
pub struct RunManager {
    shared: Arc<Shared>,
    slot: Mutex<Slot>,
}

impl RunManager {
    /// Create a manager persisting state at `settings.state_path`
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>, settings: Arc<Settings>) -> Self {
        let store = StateStore::new(&settings.state_path);
        Self {
            shared: Arc::new(Shared {
                client,
                settings,
                store,
                last_error: RwLock::new(None),
            }),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// The state store used by runs
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.shared.store
    }

    /// Launch a run in the background.
    ///
    /// Returns `false` without doing anything if a run is already active.
    pub async fn start(&self, plan: RunPlan) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.is_running() {
            warn!("Run already in progress, ignoring start");
            return false;
        }

        *self.shared.last_error.write().await = None;
        let stop = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = stop.clone();
        slot.task = Some(tokio::spawn(async move {
            shared.run_with_resume(plan, token).await;
        }));
        slot.stop = Some(stop);
        slot.started_at = Some(Utc::now());
        info!("Run started");
        true
    }

    /// Request the active run to stop.
    ///
    /// Returns `false` if nothing is running. The run finishes its in-flight
    /// request and records its phase before exiting.
    pub async fn stop(&self) -> bool {
        let slot = self.slot.lock().await;
        match (&slot.stop, slot.is_running()) {
            (Some(token), true) => {
                token.cancel();
                info!("Stop requested");
                true
            }
            _ => false,
        }
    }

    /// Current status
    pub async fn status(&self) -> RunStatus {
        let slot = self.slot.lock().await;
        RunStatus {
            running: slot.is_running(),
            started_at: slot.started_at,
            last_error: self.shared.last_error.read().await.clone(),
        }
    }

    /// Wait for the active run, if any, to finish
    pub async fn join(&self) {
        let task = self.slot.lock().await.task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Run task failed: {}", e);
            }
        }
    }

    /// Reset persisted state.
    ///
    /// # Errors
    ///
    /// Refuses with `RunError::Precondition("run_in_progress")` while a run is
    /// active, or propagates a persistence failure.
    pub async fn reset(&self) -> Result<RunState, RunError> {
        let slot = self.slot.lock().await;
        if slot.is_running() {
            return Err(RunError::Precondition("run_in_progress"));
        }
        Ok(self.shared.store.reset().await?)
    }
}

impl Shared {
    async fn run_with_resume(&self, mut plan: RunPlan, stop: CancellationToken) {
        loop {
            let err = match self.run_once(&plan, &stop).await {
                Ok(_) => {
                    *self.last_error.write().await = None;
                    return;
                }
                Err(err) => err,
            };

            error!("Run failed: {}", err);
            *self.last_error.write().await = Some(err.code().to_string());
            self.force_idle().await;

            let RunError::RateLimited { wait_secs } = err else {
                return;
            };
            if !self.settings.flood_wait_resume || wait_secs > self.settings.max_flood_wait_seconds {
                warn!("Not resuming after a {}s rate limit", wait_secs);
                return;
            }

            warn!("Rate limited, resuming in {}s", wait_secs);
            tokio::select! {
                () = stop.cancelled() => return,
                () = tokio::time::sleep(Duration::from_secs(wait_secs)) => {}
            }
            plan.fresh = false;
        }
    }

    async fn run_once(
        &self,
        plan: &RunPlan,
        stop: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        self.settings.validate_for_run()?;
        if plan.bot_username.trim().is_empty() {
            return Err(RunError::Precondition("missing_bot_username"));
        }

        self.client.connect().await?;
        let result = self.drive(plan, stop).await;
        if let Err(e) = self.client.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
        result
    }

    async fn drive(&self, plan: &RunPlan, stop: &CancellationToken) -> Result<RunSummary, RunError> {
        if !self.client.is_authorized().await? {
            return Err(ClientError::Unauthorized.into());
        }
        let peer = retry_client_read(|| self.client.resolve_peer(&plan.bot_username)).await?;

        let mut state = self.store.load().await?;
        if plan.fresh || state.titles.is_empty() {
            state.queue_titles(plan.titles.clone());
        }
        let titles = state.titles.clone();
        let flow = plan.mode.flow();

        let ctx = RunContext {
            client: self.client.as_ref(),
            peer: &peer,
            settings: &self.settings,
            store: &self.store,
            stop,
        };
        run_titles(&ctx, &titles, &mut state, flow.as_ref()).await
    }

    async fn force_idle(&self) {
        let mut state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not load state to mark it idle: {}", e);
                return;
            }
        };
        if state.phase == Phase::Idle {
            return;
        }
        state.phase = Phase::Idle;
        if let Err(e) = self.store.save(&mut state).await {
            warn!("Could not mark state idle: {}", e);
        }
    }
}
