//! Retry Policy
//!
//! Exponential backoff with jitter. The retry loop itself runs in the client;
//! the retry interceptor only classifies responses against this policy.

use std::collections::BTreeSet;
use std::time::Duration;

/// Status codes that are retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

const BACKOFF_MULTIPLIER: f64 = 2.0;
const JITTER: f64 = 0.1;

/// Retry configuration. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(10))
    }
}

impl RetryConfig {
    /// Create a retry configuration with the default retryable status codes.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }

    /// Replace the retryable status code set.
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    /// Whether a status code is retry-eligible.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    ///
    /// A server supplied `Retry-After` wins over the computed backoff but is
    /// still capped.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(retry_after) = retry_after {
            return retry_after.min(self.max_delay);
        }

        let base = self.base_delay.as_millis() as f64
            * BACKOFF_MULTIPLIER.powi(retry.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * JITTER;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped + jitter).clamp(0.0, self.max_delay.as_millis() as f64);

        Duration::from_millis(final_delay as u64)
    }
}
