//! Bounded retry with fixed or exponential backoff.
//!
//! Wraps a whole collection fetch (all of its pages), not individual page
//! requests, so a retry restarts the collection from offset 0.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    #[serde(default = "default_exponential")]
    pub exponential_backoff: bool,
    /// Upper bound on a single backoff sleep. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

fn default_exponential() -> bool {
    true
}

impl RetryPolicy {
    /// Fast sources: advisors, clients, reports, registrations.
    pub fn phase_one() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_500,
            exponential_backoff: true,
            max_delay_ms: None,
        }
    }

    /// Message history. Large and less critical, so a shorter budget.
    pub fn phase_two() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1_500,
            exponential_backoff: true,
            max_delay_ms: None,
        }
    }

    /// Sleep after `attempt` (1-based) has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = if self.exponential_backoff {
            let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
            self.base_delay_ms.saturating_mul(exponent)
        } else {
            self.base_delay_ms
        };
        let ms = match self.max_delay_ms {
            Some(cap) => ms.min(cap),
            None => ms,
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::phase_one()
    }
}

/// Errors that know whether another attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        SyncError::is_retryable(self)
    }
}

/// Run `op` until it succeeds, a non-retryable error comes back, or
/// `policy.max_attempts` attempts have been made. The last error is returned
/// unchanged; deciding on a fallback is the caller's job.
pub async fn with_retry<T, E, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !err.is_retryable() {
                    if attempt > 1 {
                        log::warn!("{}: giving up after {} attempts: {}", label, attempt, err);
                    }
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "{}: retry {}/{} after error: {} (sleep {:?})",
                    label,
                    attempt,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::phase_one();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1_500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(3_000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(6_000));
    }

    #[test]
    fn test_fixed_delay_and_cap() {
        let fixed = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 200,
            exponential_backoff: false,
            max_delay_ms: None,
        };
        assert_eq!(fixed.delay_after(3), Duration::from_millis(200));

        let capped = RetryPolicy {
            max_delay_ms: Some(2_000),
            ..RetryPolicy::phase_one()
        };
        assert_eq!(capped.delay_after(3), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds_with_backoff() {
        let start = Instant::now();
        let calls: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

        let seen = calls.clone();
        let result: Result<&str, SyncError> =
            with_retry("test", &RetryPolicy::phase_one(), || {
                let seen = seen.clone();
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.push(start.elapsed());
                    if seen.len() < 3 {
                        Err(SyncError::Timeout(7_000))
                    } else {
                        Ok("clients")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("clients"));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(1_500));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_not_retried() {
        let count = AtomicU32::new(0);
        let result: Result<u32, SyncError> = with_retry("test", &RetryPolicy::phase_one(), || {
            count.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_error_is_returned() {
        let count = AtomicU32::new(0);
        let result: Result<(), SyncError> = with_retry("test", &RetryPolicy::phase_two(), || {
            let n = count.fetch_add(1, Ordering::SeqCst);
            async move { Err(SyncError::Network(format!("attempt {}", n + 1))) }
        })
        .await;
        assert_eq!(result, Err(SyncError::Network("attempt 2".into())));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let count = AtomicU32::new(0);
        let result: Result<(), SyncError> = with_retry("test", &RetryPolicy::phase_one(), || {
            count.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Unauthorized) }
        })
        .await;
        assert_eq!(result, Err(SyncError::Unauthorized));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::phase_one()
        };
        let count = AtomicU32::new(0);
        let _: Result<(), SyncError> = with_retry("test", &policy, || {
            count.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::RateLimited) }
        })
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
