//! Retry policy for transient failures
//!
//! A `RetryPolicy` wraps a fallible async operation and re-runs it on
//! retryable errors. The policy owns the attempt budget and the delay
//! schedule; the error type decides retryability through the `Retryable`
//! trait, so non-retryable failures (a 404, a contract violation) surface
//! immediately without burning attempts.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Classifies an error as worth retrying or terminal.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed(Duration),
    /// Delay doubles after each retry, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Delay before the given retry (0 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(retry);
                (*initial).saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Attempt budget plus delay schedule for one class of operation.
///
/// `max_retries` counts additional attempts after the first, so a policy
/// with `max_retries = 3` runs an operation up to 4 times.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Fixed-delay policy, the default for key source fetching.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries, BackoffStrategy::Fixed(delay))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `operation` until it succeeds, exhausts the attempt budget, or
    /// fails with a non-retryable error.
    ///
    /// Returns the last error observed. Callers distinguish exhaustion from
    /// a terminal failure by checking `is_retryable` on the returned error.
    pub async fn retry<T, E, F, Fut>(&self, op_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt >= self.max_retries {
                        warn!(
                            "{op_name} failed after {} attempts: {err}",
                            self.max_attempts()
                        );
                        return Err(err);
                    }
                    let delay = self.backoff.delay_for(attempt);
                    debug!(
                        "{op_name} attempt {} failed ({err}), retrying in {delay:?}",
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_up_to_max_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = policy
            .retry("always-fails", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { retryable: true }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32, TestError> = policy
            .retry("flaky", || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(TestError { retryable: true })
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = policy
            .retry("terminal", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { retryable: false }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = policy
            .retry("once", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { retryable: true }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = BackoffStrategy::Fixed(Duration::from_secs(2));
        assert_eq!(backoff.delay_for(0), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(7), Duration::from_secs(2));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = BackoffStrategy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(5));
    }
}
