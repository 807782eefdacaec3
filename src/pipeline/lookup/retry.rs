//! Retry policy as a value: attempt budget, backoff function and a
//! per-error decision, applied the same way to every provider.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::constants::LOOKUP_MAX_JITTER_SECS;
use crate::common::error::LookupFailure;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again; `after` is a server-supplied wait that replaces the computed backoff.
    Retry { after: Option<Duration> },
    Abort,
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;
}

impl Retryable for LookupFailure {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            LookupFailure::RateLimited { retry_after } => RetryDecision::Retry { after: *retry_after },
            LookupFailure::Transient(_) => RetryDecision::Retry { after: None },
            LookupFailure::PermanentClient { .. } | LookupFailure::Unexpected(_) => RetryDecision::Abort,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_jitter: Duration::from_secs_f64(LOOKUP_MAX_JITTER_SECS),
        }
    }

    /// Retries back to back with no waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Wait before retrying after `attempt` (1-based), jitter excluded.
    ///
    /// A server hint wins; otherwise the wait grows linearly with the attempt number.
    pub fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        hint.unwrap_or(self.base_delay * attempt)
    }

    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        self.backoff(attempt, hint) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..=self.max_jitter.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Run `op` until it succeeds, the error says to abort, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned on failure;
    /// no wait happens after the final attempt.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let after = match err.retry_decision() {
                RetryDecision::Abort => {
                    warn!(operation, attempt, error = %err, "not retryable, giving up");
                    return Err(err);
                }
                RetryDecision::Retry { after } => after,
            };

            if attempt >= max_attempts {
                warn!(operation, attempt, max_attempts, error = %err, "retries exhausted");
                return Err(err);
            }

            let wait = self.delay_for(attempt, after);
            warn!(
                operation,
                attempt,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            metrics::lookup::retry_scheduled(operation);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_is_linear_in_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.backoff(1, None), Duration::from_secs(1));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(2));
    }

    #[test]
    fn server_hint_replaces_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.backoff(2, Some(Duration::from_secs(9))), Duration::from_secs(9));
    }

    #[test]
    fn jitter_stays_within_half_a_second() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        for _ in 0..50 {
            let d = policy.delay_for(1, None);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn classification_of_lookup_failures() {
        assert_eq!(
            LookupFailure::Transient("reset".into()).retry_decision(),
            RetryDecision::Retry { after: None }
        );
        assert_eq!(
            LookupFailure::PermanentClient { status: 401, body: String::new() }.retry_decision(),
            RetryDecision::Abort
        );
        assert_eq!(LookupFailure::Unexpected("x".into()).retry_decision(), RetryDecision::Abort);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_attempts_without_trailing_wait() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1)).with_jitter(Duration::ZERO);
        let started = tokio::time::Instant::now();
        let result: Result<(), LookupFailure> = policy
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LookupFailure::Transient("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after attempt 1, 2s after attempt 2, nothing after attempt 3
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_short_circuits() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let result: Result<(), LookupFailure> = policy
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LookupFailure::PermanentClient { status: 400, body: "bad".into() })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
