//! Resilience
//!
//! - **Retry**: exponential backoff policy with jitter
//! - **Circuit Breaker**: closed / open / half-open failure gate
//! - **Rate Limiter**: timer-refilled token bucket

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use retry::{RetryConfig, DEFAULT_RETRYABLE_STATUS_CODES};

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    DEFAULT_CIRCUIT_BREAKER_CONFIG,
};

pub use rate_limiter::{
    create_mock_rate_limiter, create_rate_limiter, MockRateLimiter, RateLimiter,
    RateLimiterConfig, RateLimiterStats, TokenBucketRateLimiter, DEFAULT_RATE_LIMITS,
};
