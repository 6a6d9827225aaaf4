use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use super::{Request, RequestInterceptor, RequestStart, Response, ResponseInterceptor};
use crate::error::CfResult;
use crate::telemetry::MetricsCollector;

/// Stamps the request start time.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRequestInterceptor;

#[async_trait]
impl RequestInterceptor for MetricsRequestInterceptor {
    async fn intercept(&self, request: &mut Request) -> CfResult<()> {
        request.extensions.insert(RequestStart(Instant::now()));
        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

/// Records the `"METHOD PATH"` aggregate for each response.
pub struct MetricsResponseInterceptor {
    collector: Arc<MetricsCollector>,
}

impl MetricsResponseInterceptor {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl ResponseInterceptor for MetricsResponseInterceptor {
    async fn intercept(&self, request: &Request, response: &mut Response) -> CfResult<()> {
        let latency = request
            .extensions
            .get::<RequestStart>()
            .map(|start| start.0.elapsed())
            .unwrap_or_default();

        self.collector
            .record(&request.endpoint(), latency, response.is_error());
        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}
