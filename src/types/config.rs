//! Configuration Types
//!
//! Client, credential and sub-system configuration.

use secrecy::SecretString;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::cache::CachingPolicy;
use crate::error::{CfResult, ConfigurationError};
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default safety margin subtracted from a token's expiry.
pub const DEFAULT_TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(30);
/// Default batch concurrency.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;
/// Default user agent.
pub const DEFAULT_USER_AGENT: &str = concat!("integrations-cloudfoundry/", env!("CARGO_PKG_VERSION"));

/// Credential material for the token endpoint.
#[derive(Clone, Default)]
pub struct Credentials {
    /// OAuth2 client identifier.
    pub client_id: Option<String>,
    /// OAuth2 client secret.
    pub client_secret: Option<SecretString>,
    /// UAA user name.
    pub username: Option<String>,
    /// UAA password.
    pub password: Option<SecretString>,
    /// Refresh token from a previous session.
    pub refresh_token: Option<SecretString>,
    /// Pre-issued access token.
    pub access_token: Option<SecretString>,
    /// Token endpoint (e.g. `https://uaa.example.com/oauth/token`).
    pub token_endpoint: Option<String>,
}

impl Credentials {
    /// Whether any grant material is present.
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.client_secret.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.refresh_token.is_none()
            && self.access_token.is_none()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |present: bool| if present { Some("[REDACTED]") } else { None };
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(self.client_secret.is_some()))
            .field("username", &self.username)
            .field("password", &redact(self.password.is_some()))
            .field("refresh_token", &redact(self.refresh_token.is_some()))
            .field("access_token", &redact(self.access_token.is_some()))
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Token manager configuration.
#[derive(Clone, Debug)]
pub struct TokenManagerConfig {
    pub credentials: Credentials,
    /// A token counts as valid only while `now < expiry - expiry_skew`.
    pub expiry_skew: Duration,
    /// Timeout for token endpoint calls.
    pub timeout: Duration,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            expiry_skew: DEFAULT_TOKEN_EXPIRY_SKEW,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Response cache configuration.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum number of entries in the memory tier.
    pub capacity: usize,
    /// Lifetime of a cached payload.
    pub default_ttl: Duration,
    /// Lifetime of an ETag validator kept for conditional requests.
    pub etag_ttl: Duration,
    /// Which responses may be cached.
    pub policy: CachingPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            default_ttl: Duration::from_secs(300),
            etag_ttl: Duration::from_secs(3600),
            policy: CachingPolicy::default(),
        }
    }
}

/// Batch executor configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum operations in flight.
    pub concurrency: usize,
    /// Deadline applied to each operation independently.
    pub operation_timeout: Duration,
    /// Delete created resources when a transactional batch fails.
    pub rollback_on_failure: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            operation_timeout: Duration::from_secs(60),
            rollback_on_failure: true,
        }
    }
}

/// Cloud Foundry client configuration.
#[derive(Clone, Debug)]
pub struct CfConfig {
    /// Cloud Controller base URL (e.g. `https://api.sys.example.com`).
    pub api_endpoint: String,
    pub credentials: Credentials,
    /// Send requests without an Authorization header.
    pub skip_auth: bool,
    pub timeout: Duration,
    pub user_agent: String,
    pub skip_tls_verification: bool,
    /// Headers added to every request.
    pub default_headers: HashMap<String, String>,
    pub token_expiry_skew: Duration,
    /// `None` disables retries.
    pub retry: Option<RetryConfig>,
    /// `None` disables the circuit breaker.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// `None` disables client-side rate limiting.
    pub rate_limit: Option<RateLimiterConfig>,
    /// `None` disables response caching.
    pub cache: Option<CacheConfig>,
    pub batch: BatchConfig,
    pub enable_logging: bool,
    pub enable_metrics: bool,
}

impl Default for CfConfig {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            credentials: Credentials::default(),
            skip_auth: false,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            skip_tls_verification: false,
            default_headers: HashMap::new(),
            token_expiry_skew: DEFAULT_TOKEN_EXPIRY_SKEW,
            retry: Some(RetryConfig::default()),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            rate_limit: None,
            cache: None,
            batch: BatchConfig::default(),
            enable_logging: true,
            enable_metrics: true,
        }
    }
}

impl CfConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> CfResult<()> {
        if self.api_endpoint.is_empty() {
            return Err(ConfigurationError::MissingRequired {
                field: "api_endpoint".to_string(),
            }
            .into());
        }
        validate_url(&self.api_endpoint)?;

        if let Some(endpoint) = &self.credentials.token_endpoint {
            validate_url(endpoint)?;
        }

        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if self.batch.concurrency == 0 {
            return Err(invalid("batch concurrency must be greater than zero"));
        }
        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.requests_per_second == 0 {
                return Err(invalid("rate limit must be greater than zero"));
            }
        }
        if let Some(cache) = &self.cache {
            if cache.capacity == 0 {
                return Err(invalid("cache capacity must be greater than zero"));
            }
        }
        if let Some(breaker) = &self.circuit_breaker {
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(invalid("circuit breaker thresholds must be greater than zero"));
            }
        }

        Ok(())
    }

    /// Token manager configuration derived from this config.
    pub fn token_manager_config(&self) -> TokenManagerConfig {
        TokenManagerConfig {
            credentials: self.credentials.clone(),
            expiry_skew: self.token_expiry_skew,
            timeout: self.timeout,
        }
    }
}

fn invalid(message: &str) -> crate::error::CfError {
    ConfigurationError::InvalidConfig {
        message: message.to_string(),
    }
    .into()
}

fn validate_url(value: &str) -> CfResult<()> {
    let url = Url::parse(value).map_err(|_| ConfigurationError::InvalidEndpoint {
        url: value.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigurationError::InvalidEndpoint {
            url: value.to_string(),
        }
        .into());
    }
    Ok(())
}
