use async_trait::async_trait;

use super::{Request, Response, ResponseInterceptor, RetryEligible};
use crate::error::CfResult;
use crate::resilience::RetryConfig;

/// Flags responses the client may retry. The retry loop itself lives in
/// [`crate::CfClient::execute`].
#[derive(Debug, Clone, Default)]
pub struct RetryInterceptor {
    config: RetryConfig,
}

impl RetryInterceptor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl ResponseInterceptor for RetryInterceptor {
    async fn intercept(&self, _request: &Request, response: &mut Response) -> CfResult<()> {
        if response.from_cache {
            return Ok(());
        }

        let eligible = match &response.error {
            Some(error) => error.is_retryable(),
            None => self.config.is_retryable_status(response.status),
        };

        if eligible {
            response.extensions.insert(RetryEligible);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "retry"
    }
}
