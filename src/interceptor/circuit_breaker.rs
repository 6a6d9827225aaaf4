use async_trait::async_trait;
use std::sync::Arc;

use super::{Request, RequestInterceptor, Response, ResponseInterceptor};
use crate::error::CfResult;
use crate::resilience::CircuitBreaker;

/// Rejects requests while the breaker is open.
pub struct CircuitBreakerRequestInterceptor {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerRequestInterceptor {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl RequestInterceptor for CircuitBreakerRequestInterceptor {
    async fn intercept(&self, _request: &mut Request) -> CfResult<()> {
        self.breaker.check()
    }

    fn name(&self) -> &str {
        "circuit_breaker"
    }
}

/// Feeds outcomes back into the breaker. Transport errors and 5xx count as
/// failures; cached responses are ignored.
pub struct CircuitBreakerResponseInterceptor {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerResponseInterceptor {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl ResponseInterceptor for CircuitBreakerResponseInterceptor {
    async fn intercept(&self, _request: &Request, response: &mut Response) -> CfResult<()> {
        if response.from_cache {
            return Ok(());
        }

        if response.error.is_some() || response.status >= 500 {
            self.breaker.record_failure();
        } else {
            self.breaker.record_success();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "circuit_breaker"
    }
}
