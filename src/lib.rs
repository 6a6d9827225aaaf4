//! Cloud Foundry Integration Module
//!
//! Resilient request pipeline for the Cloud Foundry v3 (Cloud Controller) API.
//!
//! # Features
//!
//! - Token lifecycle: static token, client credentials, password and refresh
//!   token grants with single-flight refresh
//! - Interceptor chain: logging, headers, auth, rate limiting, metrics,
//!   circuit breaking, retry classification, response caching
//! - Response cache with TTL, ETag revalidation and multi-tier chains
//! - Batch execution with bounded parallelism and best-effort rollback
//! - Pagination over v3 list endpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use integrations_cloudfoundry::{cf_config, CfClient};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = cf_config()
//!         .api_endpoint("https://api.sys.example.com")
//!         .token_endpoint("https://login.sys.example.com/oauth/token")
//!         .client_credentials("my-client", "my-secret")
//!         .from_env()
//!         .build()?;
//!
//!     let client = CfClient::new(config)?;
//!     let apps: Vec<Value> = client.list_all("/v3/apps", &[("per_page", "50")]).await?;
//!     println!("{} apps", apps.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: configuration and token types
//! - `error`: error taxonomy
//! - `core`: HTTP transport
//! - `token`: grant selection and token management
//! - `interceptor`: request/response values, the chain and stock interceptors
//! - `cache`: cache backends, manager, chain and policy
//! - `resilience`: retry policy, circuit breaker, rate limiter
//! - `telemetry`: tracing subscriber setup and request metrics
//! - `batch`: batch executor, resource registry and transactions
//! - `pagination`: v3 list pagination
//! - `client`: [`CfClient`] tying the pipeline together

pub mod batch;
pub mod builders;
pub mod cache;
pub mod client;
pub mod core;
pub mod error;
pub mod interceptor;
pub mod pagination;
pub mod resilience;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{cf_client, CfClient, CfClientBuilder};

// Re-export builders
pub use builders::{cf_config, CfConfigBuilder};

// Re-export errors
pub use error::{
    parse_api_error, parse_token_error, ApiError, AuthenticationError, BatchError, CacheError,
    CfError, CfResult, ConfigurationError, NetworkError, ProtocolError,
};

// Re-export types
pub use types::{
    BatchConfig, CacheConfig, CfConfig, Credentials, Token, TokenManagerConfig, TokenResponse,
};

// Re-export core components
pub use core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport};

// Re-export token management
pub use token::{
    create_token_manager, DefaultTokenManager, GrantStrategy, GrantType, MockTokenManager,
    TokenManager,
};

// Re-export interceptors
pub use interceptor::{
    InterceptorChain, Request, RequestInterceptor, Response, ResponseInterceptor,
};

// Re-export cache
pub use cache::{
    CacheBackend, CacheChain, CacheEntry, CacheManager, CacheStats, CachingPolicy, MemoryCache,
    NoopCache,
};

// Re-export resilience
pub use resilience::{
    create_mock_rate_limiter, create_rate_limiter, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerStats, CircuitState, MockRateLimiter, RateLimiter, RateLimiterConfig,
    RateLimiterStats, RetryConfig, TokenBucketRateLimiter, DEFAULT_CIRCUIT_BREAKER_CONFIG,
    DEFAULT_RATE_LIMITS, DEFAULT_RETRYABLE_STATUS_CODES,
};

// Re-export telemetry
pub use telemetry::{init_tracing, EndpointMetrics, LogFormat, LogLevel, LoggingConfig, MetricsCollector};

// Re-export batch
pub use batch::{
    create_batch_executor, create_batch_transaction, BatchExecutor, BatchOperation, BatchResult,
    BatchTransaction, OperationType, ResourceHandler, ResourceRegistry, TransactionOutcome,
};

// Re-export pagination
pub use pagination::{Page, PageIterator, Pagination};
