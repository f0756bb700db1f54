//! Bounded retry policy shared by enumeration and the scheduler.
//!
//! The policy is a plain value: how many attempts, and how long to wait
//! before each retry. Callers decide what to do with it: the stream wraps a
//! page fetch in [`with_retry`], while the scheduler asks
//! [`RetryPolicy::delay_for`] and re-enqueues the repository on a timer.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};

use crate::sync::{DEFAULT_MAX_ATTEMPTS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            with_jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[inline]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    fn builder(&self, retries: usize) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(retries);
        if self.with_jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// Exponential backoff for the retries this policy allows.
    #[must_use]
    pub fn into_backoff(&self) -> ExponentialBuilder {
        self.builder(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1) as usize;
        self.builder(attempt)
            .build()
            .nth(attempt - 1)
            .unwrap_or(self.max_delay)
    }
}

/// Run `operation`, retrying errors accepted by `is_retryable` according to
/// `policy`.
///
/// `on_retry` is called before each sleep with the error, the delay, and the
/// number of the attempt that just failed.
pub async fn with_retry<T, E, F, Fut, IsRetryable, OnRetry>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: IsRetryable,
    on_retry: OnRetry,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    IsRetryable: Fn(&E) -> bool,
    OnRetry: Fn(&E, Duration, u32),
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(policy.into_backoff())
        .notify(|err, dur| on_retry(err, dur, attempt.load(Ordering::SeqCst)))
        .when(|err| is_retryable(err))
        .await
}
