//! Retry with exponential backoff.
//!
//! The datastore signals throttling as `Unavailable`; callers retry with
//! exponential backoff (base 100 ms, multiplier 2, at least three
//! attempts) before surfacing the error.

use std::future::Future;
use std::time::Duration;

/// Backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            multiplier: 2,
            max_attempts: 3,
        }
    }
}

/// Runs `f` until it succeeds, the error is not retryable, or the attempt
/// budget is spent.
pub async fn with_backoff<T, E, F, Fut>(
    policy: Backoff,
    is_retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = policy.base;
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                tracing::debug!(attempt, error = %e, "transient error, backing off");
                tokio::time::sleep(delay).await;
                delay *= policy.multiplier;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
