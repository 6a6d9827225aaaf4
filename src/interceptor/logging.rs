use async_trait::async_trait;

use super::{Request, RequestInterceptor, Response, ResponseInterceptor};
use crate::error::CfResult;

/// Logs each outgoing request at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRequestInterceptor;

#[async_trait]
impl RequestInterceptor for LoggingRequestInterceptor {
    async fn intercept(&self, request: &mut Request) -> CfResult<()> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            has_body = request.body.is_some(),
            "Sending request"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Logs each response: error level for failures, debug otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingResponseInterceptor;

#[async_trait]
impl ResponseInterceptor for LoggingResponseInterceptor {
    async fn intercept(&self, request: &Request, response: &mut Response) -> CfResult<()> {
        if let Some(error) = &response.error {
            tracing::error!(
                method = %request.method,
                path = %request.path,
                error = %error,
                "Request failed"
            );
        } else if response.status >= 400 {
            tracing::error!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                "Request returned error status"
            );
        } else {
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                from_cache = response.from_cache,
                "Received response"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
