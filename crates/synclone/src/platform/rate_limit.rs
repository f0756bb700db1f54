//! Adaptive per-host rate limiting.
//!
//! Each provider host gets one [`RateLimiter`] shared by every request made
//! against it. The limiter is a token bucket whose refill rate is re-derived
//! from the quota headers the provider returns, plus a host-wide suspension
//! window used when the provider reports the quota as exhausted.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use thiserror::Error;
use tokio::time::Instant;

use super::types::{ProviderKind, RateLimitInfo};
use crate::cancel::CancelToken;

/// Static request ceiling, independent of the adaptive estimate.
type Ceiling = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default rate limits per platform (requests per second).
pub mod rate_limits {
    /// GitHub: 5000 requests/hour = ~1.4/sec, we use 10/sec to allow bursts.
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
    /// GitLab: 2000 requests/minute = ~33/sec, we use 5/sec for safety.
    pub const GITLAB_DEFAULT_RPS: u32 = 5;
    /// Gitea/Forgejo: varies by instance, conservative default.
    pub const GITEA_DEFAULT_RPS: u32 = 5;
    /// Gogs has no rate-limit headers at all; stay polite.
    pub const GOGS_DEFAULT_RPS: u32 = 5;

    /// Lowest refill rate the adaptive estimate may fall to.
    pub const MIN_REFILL_PER_SECOND: f64 = 0.05;

    /// Wait applied when a provider says "rate limited" without a usable
    /// reset time.
    pub const FALLBACK_RESET_SECS: u64 = 60;
}

/// Get the default rate limit for a provider.
pub fn default_rps_for_provider(kind: ProviderKind) -> u32 {
    match kind {
        ProviderKind::GitHub => rate_limits::GITHUB_DEFAULT_RPS,
        ProviderKind::GitLab => rate_limits::GITLAB_DEFAULT_RPS,
        ProviderKind::Gitea => rate_limits::GITEA_DEFAULT_RPS,
        ProviderKind::Gogs => rate_limits::GOGS_DEFAULT_RPS,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("cancelled while waiting for rate limit")]
    Cancelled,
}

/// Tuning for one limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Bucket capacity.
    pub burst_size: u32,
    /// Initial refill rate, before any headers have been observed.
    pub refill_per_second: f64,
    /// Floor for the adaptive refill rate.
    pub min_refill_per_second: f64,
    /// Optional hard ceiling enforced with `governor`.
    pub ceiling_rps: Option<u32>,
}

impl RateLimiterConfig {
    pub fn for_provider(kind: ProviderKind) -> Self {
        let rps = default_rps_for_provider(kind);
        Self {
            burst_size: rps,
            refill_per_second: f64::from(rps),
            min_refill_per_second: rate_limits::MIN_REFILL_PER_SECOND,
            ceiling_rps: Some(rps),
        }
    }

    /// Bucket only, no static ceiling.
    pub fn bucket(burst_size: u32, refill_per_second: f64) -> Self {
        Self {
            burst_size,
            refill_per_second,
            min_refill_per_second: rate_limits::MIN_REFILL_PER_SECOND,
            ceiling_rps: None,
        }
    }
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterState {
    pub tokens_remaining: f64,
    pub refill_rate: f64,
    pub reset_at: Option<DateTime<Utc>>,
    pub burst_size: u32,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
    suspended_until: Option<Instant>,
    reset_at: Option<DateTime<Utc>>,
}

impl Bucket {
    fn refill(&mut self, now: Instant, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(burst);
        self.last_refill = now;
    }

    /// Take a token, or report how long to wait before trying again.
    fn try_take(&mut self, now: Instant, burst: f64) -> Option<Duration> {
        if let Some(until) = self.suspended_until {
            if now < until {
                return Some(until - now);
            }
            // The provider window has rolled over.
            self.suspended_until = None;
            self.tokens = burst;
            self.last_refill = now;
        }

        self.refill(now, burst);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64(
                (1.0 - self.tokens) / self.refill_rate,
            ))
        }
    }

    fn suspend(&mut self, until: Instant) {
        self.suspended_until = Some(match self.suspended_until {
            Some(current) => current.max(until),
            None => until,
        });
        self.tokens = 0.0;
    }
}

/// Token-bucket limiter for one provider host.
///
/// Safe for concurrent use; the bucket lock is never held across an await.
pub struct RateLimiter {
    host: String,
    burst: f64,
    min_refill: f64,
    bucket: Mutex<Bucket>,
    ceiling: Option<Ceiling>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("host", &self.host)
            .field("state", &self.state())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(host: impl Into<String>, config: RateLimiterConfig) -> Self {
        let burst = f64::from(config.burst_size.max(1));
        let min_refill = config.min_refill_per_second.max(0.001);
        let ceiling = config
            .ceiling_rps
            .and_then(NonZeroU32::new)
            .map(|rps| GovernorRateLimiter::direct(Quota::per_second(rps)));

        Self {
            host: host.into(),
            burst,
            min_refill,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refill_rate: config.refill_per_second.max(min_refill),
                last_refill: Instant::now(),
                suspended_until: None,
                reset_at: None,
            }),
            ceiling,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until a request may be issued.
    ///
    /// Quota exhaustion is absorbed here as a wait; the only error is
    /// cancellation.
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<(), RateLimitError> {
        loop {
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }

            let wait = self.bucket().try_take(Instant::now(), self.burst);
            let Some(wait) = wait else {
                break;
            };

            tracing::trace!(host = %self.host, wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if let Some(ref ceiling) = self.ceiling {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = ceiling.until_ready() => {}
            }
        }

        Ok(())
    }

    /// Update the estimate from response headers.
    ///
    /// The refill rate becomes `remaining / seconds_until_reset`, so pacing
    /// follows the provider's real window. A zero `remaining` suspends the
    /// host until the reset time.
    pub fn observe(&self, info: &RateLimitInfo) {
        let now = Instant::now();
        let until_reset = (info.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let mut bucket = self.bucket();
        bucket.refill(now, self.burst);
        bucket.reset_at = Some(info.reset_at);

        if info.remaining == 0 {
            if !until_reset.is_zero() {
                bucket.suspend(now + until_reset);
                tracing::debug!(
                    host = %self.host,
                    wait_secs = until_reset.as_secs(),
                    "Quota exhausted, pausing until reset"
                );
            }
            return;
        }

        if !until_reset.is_zero() {
            let rate = info.remaining as f64 / until_reset.as_secs_f64();
            bucket.refill_rate = rate.max(self.min_refill);
            bucket.tokens = bucket.tokens.min(info.remaining as f64);
        }
    }

    /// Suspend every caller for this host after a rate-limit response.
    ///
    /// `retry_after` wins over `reset_at`. Returns the wait that was applied.
    pub fn suspend_until_reset(&self, info: &RateLimitInfo) -> Duration {
        let wait = info.retry_after.unwrap_or_else(|| {
            (info.reset_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        });
        let wait = if wait.is_zero() {
            Duration::from_secs(1)
        } else {
            wait
        };

        let mut bucket = self.bucket();
        bucket.suspend(Instant::now() + wait);
        bucket.reset_at = Some(info.reset_at);

        tracing::warn!(
            host = %self.host,
            wait_secs = wait.as_secs(),
            "Rate limit hit, suspending requests for host"
        );
        wait
    }

    /// Remaining suspension, if the host is currently paused.
    pub fn suspended_for(&self) -> Option<Duration> {
        let now = Instant::now();
        self.bucket()
            .suspended_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn state(&self) -> RateLimiterState {
        let mut bucket = self.bucket();
        bucket.refill(Instant::now(), self.burst);
        RateLimiterState {
            tokens_remaining: bucket.tokens,
            refill_rate: bucket.refill_rate,
            reset_at: bucket.reset_at,
            burst_size: self.burst as u32,
        }
    }
}

/// Shared limiters keyed by host, so every client talking to the same host
/// draws from one bucket.
#[derive(Clone, Default)]
pub struct RateLimiterRegistry {
    limiters: Arc<Mutex<HashMap<String, Arc<RateLimiter>>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_host(&self, kind: ProviderKind, host: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            limiters
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(host, RateLimiterConfig::for_provider(kind)))),
        )
    }

    pub fn len(&self) -> usize {
        self.limiters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(remaining: usize, reset_in: chrono::Duration) -> RateLimitInfo {
        RateLimitInfo {
            limit: 5000,
            remaining,
            reset_at: Utc::now() + reset_in,
            retry_after: None,
        }
    }

    #[test]
    fn provider_defaults_match_constants() {
        let github = RateLimiterConfig::for_provider(ProviderKind::GitHub);
        assert_eq!(github.burst_size, rate_limits::GITHUB_DEFAULT_RPS);
        assert_eq!(github.ceiling_rps, Some(rate_limits::GITHUB_DEFAULT_RPS));
        assert_eq!(
            default_rps_for_provider(ProviderKind::Gogs),
            rate_limits::GOGS_DEFAULT_RPS
        );
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_is_immediate_within_burst_then_paces() {
        let limiter = RateLimiter::new("h", RateLimiterConfig::bucket(3, 2.0));
        let cancel = CancelToken::new();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire(&cancel).await.expect("acquire");
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(&cancel).await.expect("acquire");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(499), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(600), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn observe_recomputes_refill_rate_from_headers() {
        let limiter = RateLimiter::new("h", RateLimiterConfig::bucket(10, 10.0));
        limiter.observe(&info(100, chrono::Duration::seconds(50)));

        let state = limiter.state();
        assert!((state.refill_rate - 2.0).abs() < 0.05, "rate {}", state.refill_rate);
        assert!(state.reset_at.is_some());
        assert_eq!(state.burst_size, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn observe_with_zero_remaining_blocks_until_reset() {
        let limiter = RateLimiter::new("h", RateLimiterConfig::bucket(10, 10.0));
        let cancel = CancelToken::new();
        limiter.observe(&info(0, chrono::Duration::seconds(5)));

        let start = Instant::now();
        limiter.acquire(&cancel).await.expect("acquire");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4900), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(5100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn suspension_applies_to_all_waiting_callers() {
        let limiter = Arc::new(RateLimiter::new("h", RateLimiterConfig::bucket(10, 10.0)));
        let cancel = CancelToken::new();
        let wait = limiter.suspend_until_reset(&info(0, chrono::Duration::seconds(5)));
        assert!(wait >= Duration::from_millis(4900));

        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.expect("acquire");
                Instant::now()
            }));
        }

        for handle in handles {
            let done = handle.await.expect("task");
            assert!(done - start >= Duration::from_millis(4900));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_takes_precedence_over_reset() {
        let limiter = RateLimiter::new("h", RateLimiterConfig::bucket(10, 10.0));
        let mut rl = info(0, chrono::Duration::seconds(600));
        rl.retry_after = Some(Duration::from_secs(2));

        let wait = limiter.suspend_until_reset(&rl);
        assert_eq!(wait, Duration::from_secs(2));
        assert!(limiter.suspended_for().is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(limiter.suspended_for().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_returns_cancelled_while_suspended() {
        let limiter = Arc::new(RateLimiter::new("h", RateLimiterConfig::bucket(10, 10.0)));
        let cancel = CancelToken::new();
        limiter.suspend_until_reset(&info(0, chrono::Duration::seconds(3600)));

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = waiter.await.expect("task");
        assert_eq!(result, Err(RateLimitError::Cancelled));
    }

    #[tokio::test]
    async fn acquire_fails_fast_when_already_cancelled() {
        let limiter = RateLimiter::new("h", RateLimiterConfig::bucket(1, 1.0));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            limiter.acquire(&cancel).await,
            Err(RateLimitError::Cancelled)
        );
    }

    #[test]
    fn registry_shares_limiter_per_host() {
        let registry = RateLimiterRegistry::new();
        let a = registry.for_host(ProviderKind::GitHub, "https://api.github.com");
        let b = registry.for_host(ProviderKind::GitHub, "https://api.github.com");
        let c = registry.for_host(ProviderKind::Gitea, "https://codeberg.org");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }
}
