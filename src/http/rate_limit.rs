//! Rate limiting implementation
//!
//! Uses the governor crate for the static token bucket and layers the
//! provider's advertised quota on top of it. When the provider reports its
//! own window (`x-ratelimit-remaining` / `x-ratelimit-reset`), that window is
//! authoritative: once it is spent, callers sleep until the provider's reset
//! instant rather than the local estimate.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use reqwest::header::HeaderMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Header carrying the number of requests left in the provider window
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the seconds until the provider window resets
pub const RESET_HEADER: &str = "x-ratelimit-reset";
/// Header carrying the number of requests used in the provider window
pub const USED_HEADER: &str = "x-ratelimit-used";

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per minute
    pub requests_per_minute: u32,
    /// Burst size (max tokens in bucket)
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 10,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size,
        }
    }

    /// Effectively unthrottled; meant for tests against local servers
    pub fn unthrottled() -> Self {
        Self {
            requests_per_minute: 60_000,
            burst_size: 1_000,
        }
    }
}

/// Quota as last reported by the provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderQuota {
    /// Requests left before the provider starts rejecting
    pub remaining: u32,
    /// When the provider window resets
    pub resets_at: Instant,
}

impl ProviderQuota {
    /// Parse the provider headers, if all needed ones are present
    pub fn from_headers(headers: &HeaderMap, now: Instant) -> Option<Self> {
        let remaining = header_f64(headers, REMAINING_HEADER)?;
        let reset = header_f64(headers, RESET_HEADER)?;
        if let Some(used) = header_f64(headers, USED_HEADER) {
            debug!(used, remaining, reset, "Provider quota observed");
        }
        Some(Self {
            remaining: remaining.max(0.0).floor() as u32,
            resets_at: now + Duration::from_secs_f64(reset.max(0.0)),
        })
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Token bucket rate limiter informed by provider quota headers
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
    provider: Arc<Mutex<Option<ProviderQuota>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            limiter: Arc::new(Governor::direct(quota)),
            provider: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait until one more request may be issued
    pub async fn acquire(&self) {
        while let Some(until) = self.reserve_provider_slot(Instant::now()) {
            warn!(
                wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Provider quota exhausted, waiting for reset"
            );
            tokio::time::sleep_until(until).await;
        }
        self.limiter.until_ready().await;
    }

    /// Take one unit of the provider window, or report when it reopens.
    ///
    /// Returns `None` when the caller may proceed.
    fn reserve_provider_slot(&self, now: Instant) -> Option<Instant> {
        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        match provider.as_mut() {
            Some(quota) if now >= quota.resets_at => {
                *provider = None;
                None
            }
            Some(quota) if quota.remaining == 0 => Some(quota.resets_at),
            Some(quota) => {
                quota.remaining -= 1;
                None
            }
            None => None,
        }
    }

    /// Feed response headers back into the limiter
    pub fn observe(&self, headers: &HeaderMap) {
        if let Some(quota) = ProviderQuota::from_headers(headers, Instant::now()) {
            self.set_provider_quota(quota);
        }
    }

    /// Record that the provider rejected a request and asked to wait
    pub fn observe_retry_after(&self, retry_after: Duration) {
        self.set_provider_quota(ProviderQuota {
            remaining: 0,
            resets_at: Instant::now() + retry_after,
        });
    }

    fn set_provider_quota(&self, quota: ProviderQuota) {
        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        *provider = Some(quota);
    }

    /// Last quota reported by the provider, if its window is still open
    pub fn provider_quota(&self) -> Option<ProviderQuota> {
        let provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        (*provider).filter(|q| Instant::now() < q.resets_at)
    }

    /// Check if a request can be made immediately
    pub fn check(&self) -> bool {
        self.provider_quota().map_or(true, |q| q.remaining > 0) && self.limiter.check().is_ok()
    }

    /// Wait with a timeout
    pub async fn acquire_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.acquire()).await.is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimiterConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("provider", &self.provider_quota())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(remaining: &str, reset: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REMAINING_HEADER, HeaderValue::from_str(remaining).unwrap());
        headers.insert(RESET_HEADER, HeaderValue::from_str(reset).unwrap());
        headers.insert(USED_HEADER, HeaderValue::from_static("12"));
        headers
    }

    #[test]
    fn test_rate_limiter_config_default() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.burst_size, 10);
    }

    #[test]
    fn test_provider_quota_from_headers() {
        let now = Instant::now();
        let quota = ProviderQuota::from_headers(&headers("587.0", "42"), now).unwrap();
        assert_eq!(quota.remaining, 587);
        assert_eq!(quota.resets_at, now + Duration::from_secs(42));
    }

    #[test]
    fn test_provider_quota_missing_headers() {
        let mut partial = HeaderMap::new();
        partial.insert(REMAINING_HEADER, HeaderValue::from_static("10"));
        assert!(ProviderQuota::from_headers(&partial, Instant::now()).is_none());

        let garbage = headers("lots", "soon");
        assert!(ProviderQuota::from_headers(&garbage, Instant::now()).is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(600, 5));

        for _ in 0..5 {
            assert!(limiter.check());
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_wait_with_timeout() {
        let limiter = RateLimiter::new(&RateLimiterConfig::unthrottled());
        assert!(limiter.acquire_with_timeout(Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_window_is_consumed() {
        let limiter = RateLimiter::new(&RateLimiterConfig::unthrottled());
        limiter.observe(&headers("2", "60"));

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.provider_quota().unwrap().remaining, 0);
        assert!(!limiter.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_provider_waits_for_reset() {
        let limiter = RateLimiter::new(&RateLimiterConfig::unthrottled());
        limiter.observe(&headers("0", "30"));

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(limiter.provider_quota().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_blocks_acquire() {
        let limiter = RateLimiter::new(&RateLimiterConfig::unthrottled());
        limiter.observe_retry_after(Duration::from_secs(5));

        assert!(!limiter.acquire_with_timeout(Duration::from_secs(1)).await);
        assert!(limiter.acquire_with_timeout(Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn test_shared_limiter_across_tasks() {
        let limiter = RateLimiter::new(&RateLimiterConfig::unthrottled());
        limiter.observe(&headers("4", "60"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(limiter.provider_quota().unwrap().remaining, 0);
    }
}
