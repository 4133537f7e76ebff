#![deny(missing_docs)]
//! Autosend library.
//!
//! Drives a Telegram media bot through "search → pick → next" flows and
//! forwards every revealed media item to a destination chat exactly once,
//! resuming from persisted state after restarts.

/// Inline button matching and clicking.
pub mod buttons;
/// Chat client seam and plain-data message types.
pub mod client;
/// Configuration management.
pub mod config;
/// Borrowed per-run collaborators.
pub mod context;
/// Errors that end a run.
pub mod error;
/// Single-run control plane.
pub mod manager;
/// Delivering media items to the destination chat.
pub mod media;
/// Bounded waits for bot replies.
pub mod polling;
/// Title queue orchestration.
pub mod runner;
/// Search-and-pick flows.
pub mod search;
/// Walking a series through its NEXT chain.
pub mod series;
/// Resumable run state and its persistence.
pub mod state;
/// Title list loading.
pub mod titles;
/// Utility functions.
pub mod utils;

#[cfg(test)]
pub mod testing;
