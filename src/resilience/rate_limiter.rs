//! Rate Limiter
//!
//! Token bucket backed by a semaphore. A background task adds one permit every
//! `1/N` seconds up to a capacity of `N`; acquiring consumes a permit for good.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{CfError, CfResult, ConfigurationError};

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Permits issued per second. Also the bucket capacity.
    pub requests_per_second: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        DEFAULT_RATE_LIMITS
    }
}

/// Default rate limiter configuration.
pub const DEFAULT_RATE_LIMITS: RateLimiterConfig = RateLimiterConfig {
    requests_per_second: 10,
};

/// Rate limiter statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub throttled_requests: u64,
}

/// Rate limiter interface.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait for a permit, or fail with [`CfError::Cancelled`] once `cancel` fires.
    async fn acquire(&self, cancel: &CancellationToken) -> CfResult<()>;

    /// Take a permit without waiting.
    fn try_acquire(&self) -> bool;

    /// Permits currently available.
    fn available_permits(&self) -> usize;

    fn get_stats(&self) -> RateLimiterStats;
}

#[derive(Default)]
struct StatCounters {
    total: AtomicU64,
    allowed: AtomicU64,
    throttled: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total.load(Ordering::Relaxed),
            allowed_requests: self.allowed.load(Ordering::Relaxed),
            throttled_requests: self.throttled.load(Ordering::Relaxed),
        }
    }
}

/// Timer-refilled token bucket.
///
/// Must be created inside a Tokio runtime. The refill task exits when the
/// limiter is dropped.
pub struct TokenBucketRateLimiter {
    config: RateLimiterConfig,
    permits: Arc<Semaphore>,
    refill_stop: CancellationToken,
    stats: StatCounters,
}

impl TokenBucketRateLimiter {
    /// Create a limiter with a full bucket and start its refill task.
    pub fn new(config: RateLimiterConfig) -> CfResult<Self> {
        if config.requests_per_second == 0 {
            return Err(ConfigurationError::InvalidConfig {
                message: "requests_per_second must be greater than zero".to_string(),
            }
            .into());
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            ConfigurationError::InvalidConfig {
                message: "rate limiter requires a running Tokio runtime".to_string(),
            }
        })?;

        let capacity = config.requests_per_second as usize;
        let permits = Arc::new(Semaphore::new(capacity));
        let refill_stop = CancellationToken::new();

        let period = Duration::from_secs_f64(1.0 / config.requests_per_second as f64);
        let bucket = Arc::downgrade(&permits);
        let stop = refill_stop.clone();

        handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(permits) = bucket.upgrade() else { break };
                        if permits.available_permits() < capacity {
                            permits.add_permits(1);
                        }
                    }
                }
            }
            tracing::trace!("Rate limiter refill task stopped");
        });

        Ok(Self {
            config,
            permits,
            refill_stop,
            stats: StatCounters::default(),
        })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

impl Drop for TokenBucketRateLimiter {
    fn drop(&mut self) {
        self.refill_stop.cancel();
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn acquire(&self, cancel: &CancellationToken) -> CfResult<()> {
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        if let Ok(permit) = self.permits.try_acquire() {
            permit.forget();
            self.stats.allowed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.stats.throttled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            requests_per_second = self.config.requests_per_second,
            "Rate limit reached, waiting for permit"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CfError::Cancelled),
            permit = self.permits.acquire() => {
                let permit = permit.map_err(|_| CfError::Cancelled)?;
                permit.forget();
                self.stats.allowed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    fn try_acquire(&self) -> bool {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.stats.allowed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.stats.throttled.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn get_stats(&self) -> RateLimiterStats {
        self.stats.snapshot()
    }
}

/// Mock rate limiter for testing.
///
/// Grants every permit unless blocked, in which case `acquire` waits for
/// cancellation.
#[derive(Default)]
pub struct MockRateLimiter {
    blocked: AtomicBool,
    stats: StatCounters,
}

impl MockRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block or unblock permit acquisition.
    pub fn set_blocked(&self, blocked: bool) -> &Self {
        self.blocked.store(blocked, Ordering::SeqCst);
        self
    }

    /// Number of acquire attempts seen.
    pub fn acquire_count(&self) -> u64 {
        self.stats.total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RateLimiter for MockRateLimiter {
    async fn acquire(&self, cancel: &CancellationToken) -> CfResult<()> {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        if self.blocked.load(Ordering::SeqCst) {
            self.stats.throttled.fetch_add(1, Ordering::Relaxed);
            cancel.cancelled().await;
            return Err(CfError::Cancelled);
        }
        self.stats.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn try_acquire(&self) -> bool {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        let allowed = !self.blocked.load(Ordering::SeqCst);
        if allowed {
            self.stats.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.throttled.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    fn available_permits(&self) -> usize {
        if self.blocked.load(Ordering::SeqCst) {
            0
        } else {
            usize::MAX
        }
    }

    fn get_stats(&self) -> RateLimiterStats {
        self.stats.snapshot()
    }
}

/// Create a token bucket rate limiter.
pub fn create_rate_limiter(config: RateLimiterConfig) -> CfResult<Arc<dyn RateLimiter>> {
    Ok(Arc::new(TokenBucketRateLimiter::new(config)?))
}

/// Create a mock rate limiter.
pub fn create_mock_rate_limiter() -> Arc<MockRateLimiter> {
    Arc::new(MockRateLimiter::new())
}
