//! Utility functions for retrying client reads and trimming log output.

use crate::client::ClientError;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Initial backoff for retried client reads
pub const CLIENT_READ_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single backoff step
pub const CLIENT_READ_MAX_BACKOFF_MS: u64 = 4000;
/// Retries after the first attempt
pub const CLIENT_READ_MAX_RETRIES: usize = 3;

/// Retry a read-only client call with exponential backoff.
///
/// Only transient transport errors are retried. Rate limits and every other
/// error are returned on first sight, so a `FLOOD_WAIT` always reaches the
/// caller untouched.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn retry_client_read<F, Fut, T>(operation: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ClientError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(CLIENT_READ_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(CLIENT_READ_MAX_BACKOFF_MS))
        .map(jitter)
        .take(CLIENT_READ_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, ClientError::is_transient)
        .await
        .map_err(|e| {
            if e.is_transient() {
                warn!(
                    "Client read failed after {} retries: {}",
                    CLIENT_READ_MAX_RETRIES, e
                );
            }
            e
        })
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use autosend::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}
