use async_trait::async_trait;
use std::sync::Arc;

use super::{Request, RequestInterceptor};
use crate::error::CfResult;
use crate::resilience::RateLimiter;

/// Waits for a rate limiter permit, or for the request to be cancelled.
pub struct RateLimitInterceptor {
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitInterceptor {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl RequestInterceptor for RateLimitInterceptor {
    async fn intercept(&self, request: &mut Request) -> CfResult<()> {
        self.limiter.acquire(&request.cancel).await
    }

    fn name(&self) -> &str {
        "rate_limit"
    }
}
