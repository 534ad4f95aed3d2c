//! Deadlines and bounded retry for network attempts.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use super::{FetchError, FetchResult};

/// Races `attempt` against `deadline`.
///
/// When the timer wins, `attempt` is dropped, which cancels it: nothing keeps
/// polling the abandoned request, and the client tears its connection down.
/// `None` disables the deadline.
pub async fn with_timeout<F>(attempt: F, deadline: Option<Duration>) -> FetchResult
where
    F: Future<Output = FetchResult>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .unwrap_or(Err(FetchError::Timeout(limit))),
        None => attempt.await,
    }
}

/// Bounded retry with exponential backoff, used only for the install path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after attempt `attempt` (zero-based) fails: `2^attempt`
    /// times the base delay.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(20)))
    }
}

/// Runs `operation` until it succeeds or `policy.attempts` attempts have
/// failed, sleeping `2^i * base` between attempts. No sleep follows the
/// final failure.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts => return Err(err),
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(attempt = attempt + 1, error = %err, ?delay, "attempt failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
