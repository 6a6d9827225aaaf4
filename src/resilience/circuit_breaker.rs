//! Circuit Breaker
//!
//! Failure-count state machine guarding one logical endpoint group.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::error::CfError;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, probing for recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening circuit.
    pub failure_threshold: u32,
    /// Number of successes to close circuit from half-open.
    pub success_threshold: u32,
    /// Duration to keep circuit open before half-open.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        DEFAULT_CIRCUIT_BREAKER_CONFIG
    }
}

/// Default circuit breaker configuration.
pub const DEFAULT_CIRCUIT_BREAKER_CONFIG: CircuitBreakerConfig = CircuitBreakerConfig {
    failure_threshold: 5,
    success_threshold: 2,
    open_duration: Duration::from_secs(30),
};

/// Circuit breaker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Requests gated by [`CircuitBreaker::check`], rejected ones included.
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub state_transitions: u64,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    stats: CircuitBreakerStats,
}

impl BreakerState {
    fn transition(&mut self, name: &str, to: CircuitState) {
        tracing::info!(
            breaker = name,
            from = self.state.as_str(),
            to = to.as_str(),
            "Circuit breaker state change"
        );
        self.state = to;
        self.stats.state_transitions += 1;
    }
}

/// Circuit breaker.
///
/// All fields live behind one lock; state transitions are the only way they
/// change.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                stats: CircuitBreakerStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Gate a request. Fails with [`CfError::CircuitOpen`] while open and the
    /// open duration has not elapsed since the last failure.
    pub fn check(&self) -> Result<(), CfError> {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        inner.stats.total_requests += 1;

        if inner.state == CircuitState::Open {
            inner.stats.rejected_requests += 1;
            let retry_after = inner
                .last_failure_time
                .map(|t| self.config.open_duration.saturating_sub(t.elapsed()));
            tracing::debug!(breaker = %self.name, "Circuit breaker rejected request");
            return Err(CfError::CircuitOpen { retry_after });
        }

        Ok(())
    }

    /// Record a successful outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        inner.stats.successful_requests += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.transition(&self.name, CircuitState::Closed);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed outcome (transport error or 5xx).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        inner.stats.failed_requests += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());

                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker opened after threshold reached"
                    );
                    inner.transition(&self.name, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.transition(&self.name, CircuitState::Open);
                inner.success_count = 0;
                inner.last_failure_time = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, applying the open → half-open timeout.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        inner.state
    }

    /// Reset the breaker to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_time = None;
    }

    pub fn get_stats(&self) -> CircuitBreakerStats {
        self.inner.lock().stats.clone()
    }

    fn advance(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        if let Some(last_failure) = inner.last_failure_time {
            if last_failure.elapsed() >= self.config.open_duration {
                inner.transition(&self.name, CircuitState::HalfOpen);
                inner.success_count = 0;
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new("default", CircuitBreakerConfig::default())
    }
}
