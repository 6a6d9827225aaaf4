//! Cloud Foundry Client
//!
//! [`CfClient`] is the generic "issue HTTP request" operation the resource
//! clients build on. Every call runs through the interceptor chain, the
//! transport and the retry loop.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cache::{CacheBackend, CacheManager, MemoryCache};
use crate::core::{HttpMethod, HttpRequest, HttpTransport, ReqwestHttpTransport};
use crate::error::{parse_api_error, CfError, CfResult, ConfigurationError};
use crate::interceptor::{
    AuthInterceptor, CacheRequestInterceptor, CacheResponseInterceptor,
    CircuitBreakerRequestInterceptor, CircuitBreakerResponseInterceptor, HeaderInterceptor,
    InterceptorChain, LoggingRequestInterceptor, LoggingResponseInterceptor,
    MetricsRequestInterceptor, MetricsResponseInterceptor, RateLimitInterceptor, Request,
    RequestInterceptor, Response, ResponseInterceptor, RetryInterceptor,
};
use crate::pagination::{parse_page_link, Page, PageIterator};
use crate::resilience::{create_rate_limiter, CircuitBreaker, RateLimiter, RetryConfig};
use crate::telemetry::MetricsCollector;
use crate::token::{create_token_manager, TokenManager};
use crate::types::CfConfig;

/// Largest response body the default transport accepts.
const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Cloud Controller client.
pub struct CfClient {
    config: CfConfig,
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    chain: InterceptorChain,
    retry: Option<RetryConfig>,
    token_manager: Option<Arc<dyn TokenManager>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    cache_manager: Option<Arc<CacheManager>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    metrics: Arc<MetricsCollector>,
}

impl CfClient {
    /// Create a client over the default reqwest transport.
    pub fn new(config: CfConfig) -> CfResult<Self> {
        CfClientBuilder::new(config).build()
    }

    pub fn builder(config: CfConfig) -> CfClientBuilder {
        CfClientBuilder::new(config)
    }

    pub fn config(&self) -> &CfConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    pub fn cache_manager(&self) -> Option<&Arc<CacheManager>> {
        self.cache_manager.as_ref()
    }

    pub fn token_manager(&self) -> Option<&Arc<dyn TokenManager>> {
        self.token_manager.as_ref()
    }

    pub fn rate_limiter(&self) -> Option<&Arc<dyn RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    pub fn interceptor_chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Send a request through the pipeline.
    ///
    /// Retry-eligible responses are re-sent up to `max_retries` times. A 401
    /// on an authenticated call drops the current token and replays once.
    /// Statuses >= 400 become [`CfError::Api`].
    pub async fn execute(&self, request: Request) -> CfResult<Response> {
        let mut retries = 0u32;
        let mut replayed = false;

        loop {
            let mut attempt = request.clone();
            self.chain.execute_request_interceptors(&mut attempt).await?;

            let mut response = match attempt.take_short_circuit() {
                Some(cached) => Response::from_cached(cached),
                None => self.send(&attempt).await?,
            };

            self.chain
                .execute_response_interceptors(&attempt, &mut response)
                .await?;

            if response.status == 401 && !replayed {
                if let Some(token_manager) = &self.token_manager {
                    tracing::debug!(endpoint = %attempt.endpoint(), "Unauthorized, replaying with fresh token");
                    token_manager.invalidate();
                    replayed = true;
                    continue;
                }
            }

            if response.is_retry_eligible() {
                if let Some(retry) = self.retry.as_ref().filter(|r| retries < r.max_retries()) {
                    retries += 1;
                    let delay = retry.delay_for(retries, retry_after(&response));
                    tracing::warn!(
                        endpoint = %attempt.endpoint(),
                        status = response.status,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying request"
                    );
                    tokio::select! {
                        _ = request.cancel.cancelled() => return Err(CfError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            }

            return finish(response);
        }
    }

    async fn send(&self, request: &Request) -> CfResult<Response> {
        let http_request = self.http_request(request)?;

        let sent = tokio::select! {
            _ = request.cancel.cancelled() => return Err(CfError::Cancelled),
            sent = self.transport.send(http_request) => sent,
        };

        Ok(match sent {
            Ok(response) => Response::from_http(response),
            Err(error) => Response::from_error(error),
        })
    }

    fn http_request(&self, request: &Request) -> CfResult<HttpRequest> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|_| ConfigurationError::InvalidEndpoint {
                url: format!("{}{}", self.config.api_endpoint, request.path),
            })?;

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        Ok(HttpRequest {
            method: request.method,
            url: url.to_string(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: Some(self.config.timeout),
        })
    }

    /// GET `path` and deserialize the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> CfResult<T> {
        self.execute(Request::get(path)).await?.json()
    }

    /// GET `path` with query parameters.
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> CfResult<T> {
        let request = params
            .iter()
            .fold(Request::get(path), |request, (name, value)| {
                request.with_query(*name, *value)
            });
        self.execute(request).await?.json()
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> CfResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Post, path, body).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> CfResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Put, path, body).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> CfResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Patch, path, body).await
    }

    /// DELETE `path`. Returns the job URL from `Location` for asynchronous
    /// deletes.
    pub async fn delete(&self, path: &str) -> CfResult<Option<String>> {
        let response = self.execute(Request::new(HttpMethod::Delete, path)).await?;
        Ok(response.header("location").map(str::to_string))
    }

    async fn send_json<B, T>(&self, method: HttpMethod, path: &str, body: &B) -> CfResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = Request::new(method, path).with_json(body)?;
        self.execute(request).await?.json()
    }

    /// Fetch every page of a list endpoint.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> CfResult<Vec<T>> {
        let first: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut pages = PageIterator::new(|next: Option<String>| {
            let first = (path.to_string(), first.clone());
            async move {
                let (path, query) = match next {
                    Some(href) => parse_page_link(&href)?,
                    None => first,
                };
                let mut request = Request::get(path);
                request.query = query;
                self.execute(request).await?.json::<Page<T>>()
            }
        });

        let resources = pages.collect_all().await?;
        tracing::debug!(
            path,
            pages = pages.pages_fetched(),
            resources = resources.len(),
            "Listed all pages"
        );
        Ok(resources)
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn finish(mut response: Response) -> CfResult<Response> {
    if let Some(error) = response.error.take() {
        return Err(error);
    }
    if response.status >= 400 {
        return Err(parse_api_error(response.status, &response.body).into());
    }
    Ok(response)
}

/// Builder for [`CfClient`].
///
/// Stock interceptors are wired from the configuration in this order.
/// Request phase: logging, headers, metrics, circuit breaker, cache, auth,
/// rate limit. Response phase: logging, metrics, circuit breaker, cache,
/// retry. Extra interceptors run after the stock ones.
pub struct CfClientBuilder {
    config: CfConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    token_manager: Option<Arc<dyn TokenManager>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    metrics: Option<Arc<MetricsCollector>>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl CfClientBuilder {
    pub fn new(config: CfConfig) -> Self {
        Self {
            config,
            transport: None,
            token_manager: None,
            cache_backend: None,
            rate_limiter: None,
            metrics: None,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_manager(mut self, token_manager: Arc<dyn TokenManager>) -> Self {
        self.token_manager = Some(token_manager);
        self
    }

    /// Backend for the response cache (e.g. a [`crate::cache::CacheChain`]).
    /// Only used when caching is configured.
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn metrics_collector(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> CfResult<CfClient> {
        let config = self.config;
        config.validate()?;

        let mut base_url = Url::parse(&config.api_endpoint).map_err(|_| {
            ConfigurationError::InvalidEndpoint {
                url: config.api_endpoint.clone(),
            }
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestHttpTransport::with_options(
                config.timeout,
                MAX_RESPONSE_SIZE,
                config.skip_tls_verification,
            )?),
        };

        let token_manager = if config.skip_auth {
            None
        } else {
            Some(self.token_manager.unwrap_or_else(|| {
                create_token_manager(config.token_manager_config(), transport.clone())
            }))
        };

        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|c| Arc::new(CircuitBreaker::new("cloud_controller", c)));

        let cache = config.cache.as_ref().map(|cache| {
            let backend = self
                .cache_backend
                .unwrap_or_else(|| Arc::new(MemoryCache::new(cache.capacity)));
            let manager = Arc::new(
                CacheManager::new(backend, cache.default_ttl).with_etag_ttl(cache.etag_ttl),
            );
            (manager, cache.policy.clone())
        });

        let rate_limiter = match (self.rate_limiter, &config.rate_limit) {
            (Some(limiter), _) => Some(limiter),
            (None, Some(rate_limit)) => Some(create_rate_limiter(rate_limit.clone())?),
            (None, None) => None,
        };

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new()));

        let mut headers = HeaderInterceptor::new(config.default_headers.clone())
            .with_header("user-agent", config.user_agent.clone());
        if !config.default_headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
            headers = headers.with_header("accept", "application/json");
        }

        let mut chain = InterceptorChain::new();

        if config.enable_logging {
            chain.add_request_interceptor(Arc::new(LoggingRequestInterceptor));
        }
        chain.add_request_interceptor(Arc::new(headers));
        if config.enable_metrics {
            chain.add_request_interceptor(Arc::new(MetricsRequestInterceptor));
        }
        if let Some(breaker) = &circuit_breaker {
            chain.add_request_interceptor(Arc::new(CircuitBreakerRequestInterceptor::new(
                breaker.clone(),
            )));
        }
        if let Some((manager, policy)) = &cache {
            chain.add_request_interceptor(Arc::new(CacheRequestInterceptor::new(
                manager.clone(),
                policy.clone(),
            )));
        }
        if let Some(token_manager) = &token_manager {
            chain.add_request_interceptor(Arc::new(AuthInterceptor::new(token_manager.clone())));
        }
        if let Some(limiter) = &rate_limiter {
            chain.add_request_interceptor(Arc::new(RateLimitInterceptor::new(limiter.clone())));
        }
        for interceptor in self.request_interceptors {
            chain.add_request_interceptor(interceptor);
        }

        if config.enable_logging {
            chain.add_response_interceptor(Arc::new(LoggingResponseInterceptor));
        }
        if config.enable_metrics {
            chain.add_response_interceptor(Arc::new(MetricsResponseInterceptor::new(
                metrics.clone(),
            )));
        }
        if let Some(breaker) = &circuit_breaker {
            chain.add_response_interceptor(Arc::new(CircuitBreakerResponseInterceptor::new(
                breaker.clone(),
            )));
        }
        if let Some((manager, policy)) = &cache {
            chain.add_response_interceptor(Arc::new(CacheResponseInterceptor::new(
                manager.clone(),
                policy.clone(),
            )));
        }
        if let Some(retry) = &config.retry {
            chain.add_response_interceptor(Arc::new(RetryInterceptor::new(retry.clone())));
        }
        for interceptor in self.response_interceptors {
            chain.add_response_interceptor(interceptor);
        }

        tracing::debug!(
            api_endpoint = %config.api_endpoint,
            request_interceptors = chain.request_interceptor_count(),
            response_interceptors = chain.response_interceptor_count(),
            "Cloud Foundry client created"
        );

        Ok(CfClient {
            retry: config.retry.clone(),
            base_url,
            transport,
            chain,
            token_manager,
            circuit_breaker,
            cache_manager: cache.map(|(manager, _)| manager),
            rate_limiter,
            metrics,
            config,
        })
    }
}

/// Create a client from a configuration.
pub fn cf_client(config: CfConfig) -> CfResult<CfClient> {
    CfClient::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachingPolicy;
    use crate::core::{HttpResponse, MockHttpTransport};
    use crate::error::{AuthenticationError, NetworkError};
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use crate::token::MockTokenManager;
    use crate::types::CacheConfig;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    fn config() -> CfConfig {
        CfConfig {
            api_endpoint: "https://api.example.com".to_string(),
            retry: Some(RetryConfig::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(5),
            )),
            ..Default::default()
        }
    }

    fn client_with(
        config: CfConfig,
        transport: Arc<MockHttpTransport>,
        tokens: Arc<MockTokenManager>,
    ) -> CfClient {
        CfClientBuilder::new(config)
            .transport(transport)
            .token_manager(tokens)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_sets_headers_and_query() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"guid": "app-1"}));
        let client = client_with(config(), transport.clone(), Arc::new(MockTokenManager::new("t0k")));

        let app: Value = client
            .get_with_params("/v3/apps/app-1", &[("include", "space")])
            .await
            .unwrap();
        assert_eq!(app["guid"], "app-1");

        let sent = transport.get_last_request().unwrap();
        assert_eq!(sent.url, "https://api.example.com/v3/apps/app-1?include=space");
        assert_eq!(sent.headers.get("authorization").map(String::as_str), Some("Bearer t0k"));
        assert_eq!(sent.headers.get("accept").map(String::as_str), Some("application/json"));
        assert!(sent.headers.contains_key("user-agent"));
        assert_eq!(sent.timeout, Some(crate::types::DEFAULT_TIMEOUT));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(HttpResponse::empty(503))
            .queue_connection_error("reset")
            .queue_json_response(200, &json!({"ok": true}));
        let client = client_with(config(), transport.clone(), Arc::new(MockTokenManager::new("t")));

        let body: Value = client.get("/v3/info").await.unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(HttpResponse::json(
            503,
            &json!({"errors": [{"code": 10001, "title": "CF-ServiceUnavailable", "detail": "down"}]}),
        ));
        let mut config = config();
        config.circuit_breaker = None;
        let client = client_with(config, transport.clone(), Arc::new(MockTokenManager::new("t")));

        let error = client.get::<Value>("/v3/apps").await.unwrap_err();
        let api = error.as_api_error().unwrap();
        assert_eq!(api.status, 503);
        assert_eq!(api.title, "CF-ServiceUnavailable");
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            404,
            &json!({"errors": [{"code": 10010, "title": "CF-ResourceNotFound", "detail": "App not found"}]}),
        );
        let client = client_with(config(), transport.clone(), Arc::new(MockTokenManager::new("t")));

        let error = client.get::<Value>("/v3/apps/none").await.unwrap_err();
        assert!(error.as_api_error().unwrap().is_not_found());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_replays_once() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(HttpResponse::empty(401))
            .queue_json_response(200, &json!({"guid": "org"}));
        let tokens = Arc::new(MockTokenManager::new("t"));
        let client = client_with(config(), transport.clone(), tokens.clone());

        let org: Value = client.get("/v3/organizations/org").await.unwrap();
        assert_eq!(org["guid"], "org");
        assert_eq!(tokens.invalidate_count(), 1);
        assert_eq!(tokens.get_count(), 2);

        transport
            .queue_response(HttpResponse::empty(401))
            .queue_response(HttpResponse::empty(401));
        let error = client.get::<Value>("/v3/organizations/org").await.unwrap_err();
        assert!(error.needs_reauth());
    }

    #[tokio::test]
    async fn test_token_failure_skips_transport() {
        let transport = Arc::new(MockHttpTransport::new());
        let tokens = Arc::new(MockTokenManager::new("t"));
        tokens.queue_error(AuthenticationError::NoCredentials.into());
        let client = client_with(config(), transport.clone(), tokens);

        let error = client.get::<Value>("/v3/apps").await.unwrap_err();
        assert!(error.to_string().contains("no valid credentials available"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_auth() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({}));
        let mut config = config();
        config.skip_auth = true;
        let client = CfClientBuilder::new(config)
            .transport(transport.clone())
            .build()
            .unwrap();

        assert!(client.token_manager().is_none());
        let _: Value = client.get("/").await.unwrap();
        assert!(!transport
            .get_last_request()
            .unwrap()
            .headers
            .contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_cached_get_skips_network() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"resources": []}));
        let mut config = config();
        config.cache = Some(CacheConfig::default());
        let tokens = Arc::new(MockTokenManager::new("t"));
        let client = client_with(config, transport.clone(), tokens.clone());

        let _: Value = client.get("/v3/spaces").await.unwrap();
        let _: Value = client.get("/v3/spaces").await.unwrap();

        assert_eq!(transport.request_count(), 1);
        assert_eq!(tokens.get_count(), 1);
        assert_eq!(client.cache_manager().unwrap().get_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_cached_error_is_replayed_as_error() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            404,
            &json!({"errors": [{"code": 10010, "title": "CF-ResourceNotFound", "detail": "App not found"}]}),
        );
        let mut config = config();
        config.cache = Some(CacheConfig {
            policy: CachingPolicy::custom().cache_errors(true),
            ..Default::default()
        });
        let client = client_with(config, transport.clone(), Arc::new(MockTokenManager::new("t")));

        for _ in 0..2 {
            let error = client.get::<Value>("/v3/apps/none").await.unwrap_err();
            assert!(error.as_api_error().map(|e| e.is_not_found()).unwrap_or(false));
        }

        assert_eq!(transport.request_count(), 1);
        assert_eq!(client.cache_manager().unwrap().get_stats().hits, 1);
        assert_eq!(client.metrics().get("GET /v3/apps/none").unwrap().total_errors, 2);
    }

    #[tokio::test]
    async fn test_circuit_opens_on_server_errors() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(HttpResponse::empty(500));
        let mut config = config();
        config.retry = None;
        config.circuit_breaker = Some(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            open_duration: Duration::from_secs(30),
        });
        let client = client_with(config, transport.clone(), Arc::new(MockTokenManager::new("t")));

        for _ in 0..2 {
            assert!(client.get::<Value>("/v3/apps").await.is_err());
        }
        let error = client.get::<Value>("/v3/apps").await.unwrap_err();
        assert!(matches!(error, CfError::CircuitOpen { .. }));
        assert_eq!(client.circuit_breaker().unwrap().state(), CircuitState::Open);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_metrics_per_endpoint() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_json_response(200, &json!({}))
            .queue_response(HttpResponse::empty(404));
        let client = client_with(config(), transport, Arc::new(MockTokenManager::new("t")));

        let _: Value = client.get("/v3/stacks").await.unwrap();
        let _ = client.get::<Value>("/v3/stacks").await;

        let aggregate = client.metrics().get("GET /v3/stacks").unwrap();
        assert_eq!(aggregate.total_requests, 2);
        assert_eq!(aggregate.total_errors, 1);
    }

    #[tokio::test]
    async fn test_list_all_follows_next_links() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_json_response(
                200,
                &json!({
                    "pagination": {"total_results": 3, "total_pages": 2,
                        "next": {"href": "https://api.example.com/v3/apps?page=2&per_page=2"}},
                    "resources": [{"guid": "a"}, {"guid": "b"}]
                }),
            )
            .queue_json_response(
                200,
                &json!({
                    "pagination": {"total_results": 3, "total_pages": 2, "next": null},
                    "resources": [{"guid": "c"}]
                }),
            );
        let client = client_with(config(), transport.clone(), Arc::new(MockTokenManager::new("t")));

        let apps: Vec<Value> = client.list_all("/v3/apps", &[("per_page", "2")]).await.unwrap();
        let guids: Vec<&str> = apps.iter().filter_map(|a| a["guid"].as_str()).collect();
        assert_eq!(guids, vec!["a", "b", "c"]);

        let urls: Vec<String> = transport.get_requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/v3/apps?per_page=2",
                "https://api.example.com/v3/apps?page=2&per_page=2",
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_latency(Duration::from_secs(5));
        transport.queue_json_response(200, &json!({}));
        let client = client_with(config(), transport, Arc::new(MockTokenManager::new("t")));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let error = client
            .execute(Request::get("/v3/apps").with_cancel(cancel))
            .await
            .unwrap_err();
        assert!(matches!(error, CfError::Cancelled));
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let transport = Arc::new(MockHttpTransport::new());
        let mut config = config();
        config.retry = None;
        let client = client_with(config, transport, Arc::new(MockTokenManager::new("t")));

        let error = client.get::<Value>("/v3/apps").await.unwrap_err();
        assert!(matches!(
            error,
            CfError::Network(NetworkError::ConnectionFailed { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let error = CfClientBuilder::new(CfConfig::default())
            .transport(Arc::new(MockHttpTransport::new()))
            .build()
            .err()
            .unwrap();
        assert_eq!(error.error_code(), "CF_CONFIG");
    }
}
