use crate::error::CrawlError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

const CANCEL_POLL: Duration = Duration::from_millis(200);

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base ^ attempt` seconds, for a base given in whole seconds
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let base = self.base_delay.as_secs_f64();
                Duration::from_secs_f64(base.powi(attempt as i32).min(3600.0))
            }
        }
    }
}

/// Result of a retried operation together with the attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: Result<T, CrawlError>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a permanent error, or runs
/// out of attempts. There is no wait after the final attempt.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CrawlError>>,
{
    retry_cancellable(policy, label, &AtomicBool::new(false), operation).await
}

/// Like [`retry`], but gives up with [`CrawlError::Cancelled`] as soon as
/// `cancel` is raised during a wait between attempts.
pub async fn retry_cancellable<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    cancel: &AtomicBool,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CrawlError>>,
{
    let max = policy.max_retries.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    value: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max && e.is_retryable() => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed for {}: {}. Retrying in {:?}",
                    attempt, max, label, e, delay
                );
                if !sleep_unless_cancelled(delay, cancel).await {
                    return RetryOutcome {
                        value: Err(CrawlError::Cancelled),
                        attempts: attempt,
                    };
                }
                attempt += 1;
            }
            Err(e) => {
                return RetryOutcome {
                    value: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}

/// Sleep for `delay`, waking early when `cancel` is raised. Returns `false`
/// when cancelled.
pub async fn sleep_unless_cancelled(delay: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(CANCEL_POLL)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            backoff: Backoff::Linear,
        }
    }

    #[test]
    fn test_delays() {
        let linear = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Linear,
        };
        assert_eq!(linear.delay_for(1), Duration::from_secs(2));
        assert_eq!(linear.delay_for(2), Duration::from_secs(4));

        let exponential = RetryPolicy {
            backoff: Backoff::Exponential,
            ..linear
        };
        assert_eq!(exponential.delay_for(1), Duration::from_secs(2));
        assert_eq!(exponential.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = retry(&policy(3), "u", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CrawlError::Status(503))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(outcome.value.unwrap(), "ok");
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = retry(&policy(3), "u", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CrawlError::Status(500)) }
        })
        .await;
        assert!(outcome.value.is_err());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = retry(&policy(5), "u", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CrawlError::Status(404)) }
        })
        .await;
        assert!(matches!(outcome.value, Err(CrawlError::Status(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_cuts_the_backoff_wait() {
        let cancel = AtomicBool::new(false);
        let slow = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            backoff: Backoff::Linear,
        };
        let started = std::time::Instant::now();
        let outcome: RetryOutcome<()> = retry_cancellable(&slow, "u", &cancel, |_| {
            cancel.store(true, Ordering::SeqCst);
            async { Err(CrawlError::Status(503)) }
        })
        .await;

        assert!(matches!(outcome.value, Err(CrawlError::Cancelled)));
        assert_eq!(outcome.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
