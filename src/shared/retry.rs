//! Retry with exponential backoff
//!
//! Storage timeouts are surfaced to callers rather than swallowed; callers
//! that can afford to wait (item swaps, finalization) wrap their persistence
//! step in [`retry_with_backoff`].

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Counts the first call
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound on any single wait
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Waits between consecutive attempts; one fewer than `max_attempts`
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_delay.min(self.max_delay),
            remaining: self.max_attempts.saturating_sub(1),
            multiplier: self.backoff_multiplier.max(1.0),
            cap: self.max_delay,
        }
    }
}

/// Capped geometric delay sequence
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    remaining: u32,
    multiplier: f64,
    cap: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        let grown = current.as_secs_f64() * self.multiplier;
        self.next = if grown.is_finite() && grown < self.cap.as_secs_f64() {
            Duration::from_secs_f64(grown)
        } else {
            self.cap
        };
        Some(current)
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the backoff runs out. Only idempotent writes belong in here.
///
/// ```ignore
/// let items = retry_with_backoff(
///     &RetryConfig::default(),
///     "replace_priced_items",
///     DomainError::is_transient,
///     || repos.priced_items().replace_all(&priced.id, items.clone()),
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, E, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: impl FnMut() -> Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delays = config.delays();
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(err) if is_retryable(&err) => err,
            Err(err) => return Err(err),
        };

        let Some(delay) = delays.next() else {
            warn!(operation = operation_name, attempts = attempt, error = %err, "Giving up");
            return Err(err);
        };
        warn!(
            operation = operation_name,
            attempt,
            error = %err,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
