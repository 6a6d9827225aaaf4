//! Interceptors
//!
//! Request/response middleware. Request-phase interceptors run in
//! registration order before the HTTP call, response-phase interceptors after
//! it. The first error aborts the phase.

pub mod auth;
pub mod cache;
pub mod circuit_breaker;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{HttpMethod, HttpResponse};
use crate::error::{CfError, CfResult, ProtocolError};

pub use auth::{AuthInterceptor, HeaderInterceptor};
pub use cache::{CacheRequestInterceptor, CacheResponseInterceptor};
pub use circuit_breaker::{CircuitBreakerRequestInterceptor, CircuitBreakerResponseInterceptor};
pub use logging::{LoggingRequestInterceptor, LoggingResponseInterceptor};
pub use metrics::{MetricsRequestInterceptor, MetricsResponseInterceptor};
pub use rate_limit::RateLimitInterceptor;
pub use retry::RetryInterceptor;

/// Start time stamped into request extensions for latency measurement.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

/// Marks a response as eligible for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryEligible;

/// A response produced without reaching the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Outbound request, owned by one request/response cycle.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    /// Path relative to the API endpoint, e.g. `/v3/apps`.
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Header names are lower-case.
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Typed side-channel metadata.
    pub extensions: http::Extensions,
    pub cancel: CancellationToken,
    short_circuit: Option<CachedResponse>,
}

impl Request {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: HashMap::new(),
            body: None,
            extensions: http::Extensions::new(),
            cancel: CancellationToken::new(),
            short_circuit: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> CfResult<Self> {
        let bytes = serde_json::to_vec(body).map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
        })?;
        self.body = Some(Bytes::from(bytes));
        self.set_header("content-type", "application/json");
        Ok(self)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// `"METHOD PATH"`, the metrics and logging label.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Answer the request without calling the transport. Remaining
    /// request-phase interceptors are skipped.
    pub fn short_circuit(&mut self, response: CachedResponse) {
        self.short_circuit = Some(response);
    }

    pub fn is_short_circuited(&self) -> bool {
        self.short_circuit.is_some()
    }

    pub fn take_short_circuit(&mut self) -> Option<CachedResponse> {
        self.short_circuit.take()
    }
}

/// Response seen by response-phase interceptors.
#[derive(Debug)]
pub struct Response {
    /// Status code; 0 when the transport failed.
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Transport or pipeline error carried with this response.
    pub error: Option<CfError>,
    pub extensions: http::Extensions,
    /// Served from cache rather than the network.
    pub from_cache: bool,
}

impl Response {
    pub fn from_http(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            error: None,
            extensions: http::Extensions::new(),
            from_cache: false,
        }
    }

    pub fn from_error(error: CfError) -> Self {
        Self {
            status: 0,
            headers: HashMap::new(),
            body: Bytes::new(),
            error: Some(error),
            extensions: http::Extensions::new(),
            from_cache: false,
        }
    }

    pub fn from_cached(cached: CachedResponse) -> Self {
        Self {
            status: cached.status,
            headers: cached.headers,
            body: cached.body,
            error: None,
            extensions: http::Extensions::new(),
            from_cache: true,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// Transport failure, or an error status.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status >= 400
    }

    pub fn is_retry_eligible(&self) -> bool {
        self.extensions.get::<RetryEligible>().is_some()
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> CfResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ProtocolError::InvalidJson {
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Request-phase interceptor.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: &mut Request) -> CfResult<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Response-phase interceptor.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, request: &Request, response: &mut Response) -> CfResult<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Ordered interceptor pipeline.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request_interceptor(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request_interceptors.push(interceptor);
    }

    pub fn add_response_interceptor(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response_interceptors.push(interceptor);
    }

    pub fn request_interceptor_count(&self) -> usize {
        self.request_interceptors.len()
    }

    pub fn response_interceptor_count(&self) -> usize {
        self.response_interceptors.len()
    }

    /// Run request-phase interceptors in order. Stops at the first error, or
    /// once an interceptor short-circuits the request.
    pub async fn execute_request_interceptors(&self, request: &mut Request) -> CfResult<()> {
        for interceptor in &self.request_interceptors {
            if request.cancel.is_cancelled() {
                return Err(CfError::Cancelled);
            }
            if request.is_short_circuited() {
                break;
            }
            if let Err(e) = interceptor.intercept(request).await {
                tracing::debug!(
                    interceptor = interceptor.name(),
                    error = %e,
                    "Request interceptor aborted request"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run response-phase interceptors in order. Stops at the first error.
    pub async fn execute_response_interceptors(
        &self,
        request: &Request,
        response: &mut Response,
    ) -> CfResult<()> {
        for interceptor in &self.response_interceptors {
            interceptor.intercept(request, response).await?;
        }
        Ok(())
    }
}
