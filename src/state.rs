//! Resumable run state
//!
//! [`RunState`] is the single persisted aggregate: the title queue, progress
//! counters, the resume anchor and the ledger of forwarded message ids.
//! [`StateStore`] persists it as JSON with an atomic temp-file rename, so a
//! reader never observes a half-written file.

use crate::client::MessageId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Current on-disk schema version
pub const STATE_VERSION: u32 = 1;

/// Errors that can occur while persisting state
#[derive(Error, Debug)]
pub enum StateError {
    /// Standard I/O error
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No run in progress
    #[default]
    Idle,
    /// A run is processing titles
    Running,
    /// A stop was requested and the run is winding down
    Stopping,
}

/// The persisted state of a title run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// Schema version
    pub version: u32,
    /// Titles queued for this run
    pub titles: Vec<String>,
    /// Next unprocessed position in `titles`
    pub current_index: usize,
    /// Lifecycle phase
    pub phase: Phase,
    /// Items forwarded since the state was created
    pub sent_total: u64,
    /// Items forwarded in the current batch
    pub sent_in_batch: u64,
    /// Forwarded message ids, oldest first
    pub sent_ids: VecDeque<MessageId>,
    /// Bot handle of the last run
    pub last_bot_chat: String,
    /// Title in progress
    pub last_title: String,
    /// Resume anchor for `last_title` (0 = none)
    pub last_media_message_id: MessageId,
    /// RFC 3339 time of the last save
    pub updated_at: String,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            titles: Vec::new(),
            current_index: 0,
            phase: Phase::Idle,
            sent_total: 0,
            sent_in_batch: 0,
            sent_ids: VecDeque::new(),
            last_bot_chat: String::new(),
            last_title: String::new(),
            last_media_message_id: 0,
            updated_at: String::new(),
        }
    }
}

impl RunState {
    /// Whether a message id was already forwarded
    #[must_use]
    pub fn has_sent(&self, id: MessageId) -> bool {
        self.sent_ids.contains(&id)
    }

    /// Add an id to the ledger, evicting the oldest entries past `capacity`.
    ///
    /// A `capacity` of 0 keeps every id.
    pub fn record_sent(&mut self, id: MessageId, capacity: usize) {
        if self.has_sent(id) {
            return;
        }
        self.sent_ids.push_back(id);
        if capacity > 0 {
            while self.sent_ids.len() > capacity {
                self.sent_ids.pop_front();
            }
        }
    }

    /// Record a confirmed forward: ledger entry plus counters.
    ///
    /// Returns `true` when this forward completed a batch.
    pub fn note_forwarded(&mut self, id: MessageId, batch_size: u64, capacity: usize) -> bool {
        self.record_sent(id, capacity);
        self.sent_total += 1;
        self.sent_in_batch += 1;
        if self.sent_in_batch >= batch_size {
            self.sent_in_batch = 0;
            info!("Batch complete: {} sent in total", self.sent_total);
            return true;
        }
        false
    }

    /// Title at `current_index`, if any remain
    #[must_use]
    pub fn current_title(&self) -> Option<&str> {
        self.titles.get(self.current_index).map(String::as_str)
    }

    /// Anchor to resume `title` from, when it is the title in progress
    #[must_use]
    pub fn resume_anchor(&self, title: &str) -> Option<MessageId> {
        (self.last_title == title && self.last_media_message_id != 0)
            .then_some(self.last_media_message_id)
    }

    /// Replace the queue and restart from its beginning
    pub fn queue_titles(&mut self, titles: Vec<String>) {
        self.titles = titles;
        self.current_index = 0;
    }

    /// Mark the title at `index` as finished and drop its anchor.
    ///
    /// The caller's title list is authoritative here, so the index is not
    /// bounded by the stored queue.
    pub fn advance_past(&mut self, index: usize) {
        self.current_index = index + 1;
        self.last_media_message_id = 0;
    }

    fn clamp(mut self) -> Self {
        self.current_index = self.current_index.min(self.titles.len());
        self
    }
}

/// File-backed store for [`RunState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// State file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file used while saving
    #[must_use]
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the state, or a default one if the file does not exist.
    ///
    /// Missing fields take their defaults and unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub async fn load(&self) -> Result<RunState, StateError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return Ok(RunState::default());
            }
            Err(source) => return Err(io_error(&self.path, source)),
        };
        let state: RunState = serde_json::from_slice(&raw)?;
        Ok(state.clamp())
    }

    /// Stamp `updated_at` and atomically replace the state file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails; the
    /// previous file is left intact in that case.
    pub async fn save(&self, state: &mut RunState) -> Result<(), StateError> {
        state.updated_at = Utc::now().to_rfc3339();
        let mut body = serde_json::to_vec_pretty(state)?;
        body.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|source| io_error(&tmp, source))?;
        file.write_all(&body)
            .await
            .map_err(|source| io_error(&tmp, source))?;
        file.sync_all()
            .await
            .map_err(|source| io_error(&tmp, source))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| io_error(&self.path, source))
    }

    /// Delete the state file and persist a fresh default state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed or written.
    pub async fn reset(&self) -> Result<RunState, StateError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!("Removed state file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(io_error(&self.path, source)),
        }
        let mut state = RunState::default();
        self.save(&mut state).await?;
        Ok(state)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sent_is_idempotent_and_bounded() {
        let mut state = RunState::default();
        state.record_sent(1, 3);
        state.record_sent(1, 3);
        assert_eq!(state.sent_ids, VecDeque::from([1]));

        for id in 2..=4 {
            state.record_sent(id, 3);
        }
        assert_eq!(state.sent_ids, VecDeque::from([2, 3, 4]));
        assert!(!state.has_sent(1));
        assert!(state.has_sent(4));
    }

    #[test]
    fn test_record_sent_zero_capacity_is_unbounded() {
        let mut state = RunState::default();
        for id in 0..5000 {
            state.record_sent(id, 0);
        }
        assert_eq!(state.sent_ids.len(), 5000);
    }

    #[test]
    fn test_note_forwarded_resets_batch() {
        let mut state = RunState::default();
        assert!(!state.note_forwarded(10, 2, 100));
        assert!(state.note_forwarded(11, 2, 100));
        assert_eq!(state.sent_total, 2);
        assert_eq!(state.sent_in_batch, 0);
        assert!(!state.note_forwarded(12, 2, 100));
        assert_eq!(state.sent_in_batch, 1);
    }

    #[test]
    fn test_resume_anchor_requires_matching_title() {
        let mut state = RunState {
            last_title: "Dark".to_string(),
            last_media_message_id: 120,
            ..RunState::default()
        };
        assert_eq!(state.resume_anchor("Dark"), Some(120));
        assert_eq!(state.resume_anchor("Lost"), None);

        state.last_media_message_id = 0;
        assert_eq!(state.resume_anchor("Dark"), None);
    }

    #[test]
    fn test_advance_past_clears_anchor() {
        let mut state = RunState::default();
        state.queue_titles(vec!["a".to_string()]);
        state.last_media_message_id = 9;
        state.advance_past(0);
        assert_eq!(state.current_index, 1);
        assert_eq!(state.last_media_message_id, 0);
        assert_eq!(state.current_title(), None);
    }

    #[test]
    fn test_advance_past_ignores_stored_queue_length() {
        let mut state = RunState::default();
        state.advance_past(1);
        assert_eq!(state.current_index, 2);
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let store = StateStore::new("/var/lib/autosend/state.json");
        assert_eq!(
            store.tmp_path(),
            PathBuf::from("/var/lib/autosend/state.json.tmp")
        );
    }

    #[tokio::test]
    async fn test_load_merges_partial_file_onto_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.json");
        tokio::fs::write(
            &path,
            r#"{"titles": ["a", "b"], "current_index": 7, "phase": "running", "legacy": true}"#,
        )
        .await?;

        let state = StateStore::new(&path).load().await?;
        assert_eq!(state.titles, vec!["a", "b"]);
        assert_eq!(state.current_index, 2);
        assert_eq!(state.phase, Phase::Running);
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.sent_ids.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_default() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let state = StateStore::new(dir.path().join("absent.json")).load().await?;
        assert_eq!(state, RunState::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_leaves_no_tmp() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = StateStore::new(dir.path().join("nested/run/state.json"));
        let mut state = RunState::default();
        state.record_sent(5, 10);

        store.save(&mut state).await?;
        assert!(!state.updated_at.is_empty());
        assert!(store.path().exists());
        assert!(!store.tmp_path().exists());

        let raw = tokio::fs::read_to_string(store.path()).await?;
        assert!(raw.ends_with('\n'));
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_replaces_state() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = StateStore::new(dir.path().join("state.json"));
        let mut state = RunState {
            sent_total: 40,
            ..RunState::default()
        };
        store.save(&mut state).await?;

        let fresh = store.reset().await?;
        assert_eq!(fresh.sent_total, 0);
        assert_eq!(store.load().await?.sent_total, 0);
        Ok(())
    }
}
