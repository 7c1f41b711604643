//! Retry with policy.
//!
//! One reusable wrapper consumed by every fetcher operation. The backoff
//! schedule is keyed by failure class: the upstream's 429 escalates
//! linearly with the attempt number, any other transient failure waits a
//! short fixed delay. Non-transient errors are never retried.

use std::future::Future;

use tokio::time::Duration;

use crate::errors::{AppError, Result};

/// Backoff schedule shared by all upstream operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,

    /// Multiplied by the attempt number after each rate-limited failure.
    pub rate_limit_backoff: Duration,

    /// Fixed delay after any other transient failure.
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(10),
            transient_backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, error: &AppError, attempt: u32) -> Duration {
        if error.is_rate_limited() {
            self.rate_limit_backoff * attempt
        } else {
            self.transient_backoff
        }
    }
}

/// Run `operation` under `policy`.
///
/// Transient failures back off and retry until the attempt budget is
/// exhausted, then the last error is returned. The backoff runs after
/// every failed attempt, the final one included, so a rate-limited
/// caller has already waited out the escalation before giving up.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<AppError> = None;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                let delay = policy.backoff_for(&e, attempt);
                tracing::warn!(
                    operation = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Request failed, backing off"
                );
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    metrics::counter!("citescout_retry_exhausted_total").increment(1);
    Err(last_error.unwrap_or(AppError::Internal {
        message: format!("{} failed with no recorded error", op_name),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn upstream_error() -> AppError {
        AppError::Upstream {
            status: 503,
            message: "unavailable".into(),
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = retry_with_policy(&policy, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_backoff_is_fixed() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_policy(&policy, "op", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(upstream_error())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two failures at 3s each
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_escalates() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<()> = retry_with_policy(&policy, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::RateLimited) }
        })
        .await;

        assert!(matches!(result, Err(AppError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Escalating 10s, 20s, 30s
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_does_not_retry() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<()> = retry_with_policy(&policy, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::Validation {
                    message: "bad input".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
