//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed timing constants of the flows.

use crate::client::ForwardMode;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Interval between polling attempts while waiting for bot replies
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How many recent messages each polling attempt inspects
pub const POLL_FETCH_LIMIT: usize = 10;
/// How many recent messages are scanned when recovering a stale start anchor
pub const START_SCAN_LIMIT: usize = 50;

/// A setting that is present but unusable for a run
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A required value is empty
    #[error("{0} is required")]
    Missing(&'static str),
    /// A value is out of range
    #[error("{name} is invalid: {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Application settings loaded from files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Handle of the media bot to drive
    pub bot_username: String,
    /// Destination chat for forwarded media
    pub target_chat_id: String,
    /// Label (or part of it) of the "next episode" button
    pub button_next_text: String,
    /// Text prepended to every search query
    pub search_send_prefix: String,

    /// Wait for the search results message
    pub search_results_timeout_seconds: u64,
    /// Wait for the bot reply after picking a result
    pub after_pick_timeout_seconds: u64,
    /// Wait for new media after pressing next
    pub wait_next_media_timeout_seconds: u64,
    /// Wait for the bot reply after picking an inline result
    pub inline_pick_timeout_seconds: u64,
    /// Click attempts on the next button before giving up
    pub max_retries_next: u32,
    /// Settle delay after each click
    pub wait_after_click_seconds: u64,
    /// Pause between titles
    pub search_delay_seconds: u64,

    /// Forwards per logged batch
    pub batch_size: u64,
    /// Copy or native forward
    pub forward_mode: ForwardMode,
    /// Resume state file
    pub state_path: String,
    /// Newline-delimited titles file
    pub titles_path: String,
    /// Capacity of the forwarded-id ledger (0 = unbounded)
    pub sent_dedup_limit: usize,

    /// Resume automatically after a peer rate limit
    pub flood_wait_resume: bool,
    /// Longest rate-limit wait that is resumed automatically
    pub max_flood_wait_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_username: String::new(),
            target_chat_id: String::new(),
            button_next_text: "Вперёд".to_string(),
            search_send_prefix: String::new(),
            search_results_timeout_seconds: 30,
            after_pick_timeout_seconds: 30,
            wait_next_media_timeout_seconds: 60,
            inline_pick_timeout_seconds: 30,
            max_retries_next: 3,
            wait_after_click_seconds: 1,
            search_delay_seconds: 0,
            batch_size: 10,
            forward_mode: ForwardMode::Copy,
            state_path: "./state.json".to_string(),
            titles_path: "./titles.txt".to_string(),
            sent_dedup_limit: 2000,
            flood_wait_resume: true,
            max_flood_wait_seconds: 600,
        }
    }
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosend::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables map onto snake_case fields;
            // empty values are treated as unset
            .add_source(
                Environment::default()
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Check the settings a run cannot start without
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate_for_run(&self) -> Result<(), SettingsError> {
        if self.target_chat_id.trim().is_empty() {
            return Err(SettingsError::Missing("TARGET_CHAT_ID"));
        }
        if self.batch_size == 0 {
            return Err(SettingsError::Invalid {
                name: "BATCH_SIZE",
                reason: "must be at least 1",
            });
        }
        if self.button_next_text.trim().is_empty() {
            return Err(SettingsError::Missing("BUTTON_NEXT_TEXT"));
        }
        Ok(())
    }

    /// Search results timeout
    #[must_use]
    pub const fn search_results_timeout(&self) -> Duration {
        Duration::from_secs(self.search_results_timeout_seconds)
    }

    /// Timeout after picking a search result
    #[must_use]
    pub const fn after_pick_timeout(&self) -> Duration {
        Duration::from_secs(self.after_pick_timeout_seconds)
    }

    /// Timeout for new media after a next click
    #[must_use]
    pub const fn next_media_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_next_media_timeout_seconds)
    }

    /// Timeout after picking an inline result
    #[must_use]
    pub const fn inline_pick_timeout(&self) -> Duration {
        Duration::from_secs(self.inline_pick_timeout_seconds)
    }

    /// Settle delay after a click
    #[must_use]
    pub const fn after_click_delay(&self) -> Duration {
        Duration::from_secs(self.wait_after_click_seconds)
    }

    /// Pause between titles
    #[must_use]
    pub const fn title_delay(&self) -> Duration {
        Duration::from_secs(self.search_delay_seconds)
    }
}
