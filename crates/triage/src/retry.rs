//! Bounded retry with exponential backoff.
//!
//! Used for every provider call. Not-found is terminal and surfaces as
//! `Ok(None)`; non-retryable errors propagate immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ErrorKind, TriageError};

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff unit; the wait after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Wait before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Run `op` until it succeeds, reports absence, or exhausts the policy.
///
/// # Returns
/// `Ok(Some(value))` on success, `Ok(None)` when the operation reported
/// [`TriageError::NotFound`].
///
/// # Errors
/// The last error once `max_attempts` is reached, or the first error that is
/// not retryable.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<Option<T>, TriageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TriageError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(operation = %operation, error = %e, "Resource not found, not retrying");
                return Ok(None);
            }
            Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = policy.backoff(attempt);
                warn!(
                    operation = %operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> TriageError {
        TriageError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    async fn fail_times(calls: &AtomicU32, failures: u32) -> Result<&'static str, TriageError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(transient())
        } else {
            Ok("done")
        }
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(3);
        for failures in 0..3 {
            let calls = AtomicU32::new(0);
            let result = with_retry(&policy, "flaky", || fail_times(&calls, failures)).await;
            assert_eq!(result.unwrap(), Some("done"));
            assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_once_per_failure() {
        let policy = RetryPolicy::default();
        let expected = [0, 2, 6];
        for (failures, waited_secs) in (0u32..).zip(expected) {
            let calls = AtomicU32::new(0);
            let start = tokio::time::Instant::now();
            let result = with_retry(&policy, "flaky", || fail_times(&calls, failures)).await;
            assert_eq!(result.unwrap(), Some("done"));
            assert_eq!(start.elapsed(), Duration::from_secs(waited_secs));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_last_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = with_retry(&policy, "broken", || fail_times(&calls, 10)).await;
        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy, "broken", || fail_times(&calls, 10)).await;
        assert!(matches!(result, Err(TriageError::Api { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_absence() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);
        let result: Result<Option<()>, _> = with_retry(&policy, "missing", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TriageError::NotFound("gone".to_string())) }
        })
        .await;
        assert!(result.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);
        let result: Result<Option<()>, _> = with_retry(&policy, "unauthorized", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TriageError::Unauthorized("bad credentials".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(TriageError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
