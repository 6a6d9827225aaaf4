//! Configuration Builder
//!
//! Fluent builder for [`CfConfig`].

use secrecy::SecretString;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CfResult;
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};
use crate::types::{BatchConfig, CacheConfig, CfConfig, Credentials};

/// Cloud Foundry configuration builder.
pub struct CfConfigBuilder {
    api_endpoint: Option<String>,
    credentials: Credentials,
    skip_auth: bool,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    skip_tls_verification: bool,
    default_headers: HashMap<String, String>,
    token_expiry_skew: Option<Duration>,
    retry: Option<RetryConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    rate_limit: Option<RateLimiterConfig>,
    cache: Option<CacheConfig>,
    batch: BatchConfig,
    enable_logging: bool,
    enable_metrics: bool,
}

impl Default for CfConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        let defaults = CfConfig::default();
        Self {
            api_endpoint: None,
            credentials: Credentials::default(),
            skip_auth: false,
            timeout: None,
            user_agent: None,
            skip_tls_verification: false,
            default_headers: HashMap::new(),
            token_expiry_skew: None,
            retry: defaults.retry,
            circuit_breaker: defaults.circuit_breaker,
            rate_limit: None,
            cache: None,
            batch: defaults.batch,
            enable_logging: true,
            enable_metrics: true,
        }
    }

    /// Set the Cloud Controller endpoint.
    pub fn api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    /// Set the UAA token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.credentials.token_endpoint = Some(endpoint.into());
        self
    }

    /// Use the client credentials grant.
    pub fn client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.credentials.client_id = Some(client_id.into());
        self.credentials.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Use the password grant.
    pub fn password_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials.username = Some(username.into());
        self.credentials.password = Some(SecretString::new(password.into()));
        self
    }

    /// Set a refresh token.
    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.refresh_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set a pre-issued access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.access_token = Some(SecretString::new(token.into()));
        self
    }

    /// Send requests without authentication.
    pub fn skip_auth(mut self, skip: bool) -> Self {
        self.skip_auth = skip;
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn skip_tls_verification(mut self, skip: bool) -> Self {
        self.skip_tls_verification = skip;
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn token_expiry_skew(mut self, skew: Duration) -> Self {
        self.token_expiry_skew = Some(skew);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Keep the default backoff but change the retry count.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let current = self.retry.take().unwrap_or_default();
        self.retry = Some(
            RetryConfig::new(max_retries, current.base_delay(), current.max_delay())
                .with_status_codes(current.retryable_status_codes().iter().copied()),
        );
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn no_circuit_breaker(mut self) -> Self {
        self.circuit_breaker = None;
        self
    }

    /// Limit outgoing requests per second.
    pub fn rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limit = Some(RateLimiterConfig {
            requests_per_second,
        });
        self
    }

    /// Enable response caching.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    pub fn batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch.concurrency = concurrency;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch.operation_timeout = timeout;
        self
    }

    pub fn rollback_on_failure(mut self, rollback: bool) -> Self {
        self.batch.rollback_on_failure = rollback;
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Load settings from `CF_*` environment variables.
    pub fn from_env(mut self) -> Self {
        if let Ok(api) = std::env::var("CF_API") {
            self.api_endpoint = Some(api);
        }
        if let Ok(url) = std::env::var("CF_TOKEN_URL") {
            self.credentials.token_endpoint = Some(url);
        }

        // Credentials
        if let Ok(username) = std::env::var("CF_USERNAME") {
            self.credentials.username = Some(username);
        }
        if let Ok(password) = std::env::var("CF_PASSWORD") {
            self.credentials.password = Some(SecretString::new(password));
        }
        if let Ok(client_id) = std::env::var("CF_CLIENT_ID") {
            self.credentials.client_id = Some(client_id);
        }
        if let Ok(secret) = std::env::var("CF_CLIENT_SECRET") {
            self.credentials.client_secret = Some(SecretString::new(secret));
        }
        if let Ok(token) = std::env::var("CF_ACCESS_TOKEN") {
            self.credentials.access_token = Some(SecretString::new(token));
        }
        if let Ok(token) = std::env::var("CF_REFRESH_TOKEN") {
            self.credentials.refresh_token = Some(SecretString::new(token));
        }

        if let Ok(val) = std::env::var("CF_SKIP_AUTH") {
            self.skip_auth = val.to_lowercase() == "true";
        }
        if let Ok(val) = std::env::var("CF_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.timeout = Some(Duration::from_secs(secs));
            }
        }
        if let Ok(val) = std::env::var("CF_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self = self.max_retries(retries);
            }
        }
        if let Ok(val) = std::env::var("CF_RATE_LIMIT") {
            if let Ok(rps) = val.parse() {
                self = self.rate_limit(rps);
            }
        }
        if let Ok(val) = std::env::var("CF_BATCH_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                self.batch.concurrency = concurrency;
            }
        }

        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> CfResult<CfConfig> {
        let defaults = CfConfig::default();
        let config = CfConfig {
            api_endpoint: self
                .api_endpoint
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            credentials: self.credentials,
            skip_auth: self.skip_auth,
            timeout: self.timeout.unwrap_or(defaults.timeout),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            skip_tls_verification: self.skip_tls_verification,
            default_headers: self.default_headers,
            token_expiry_skew: self.token_expiry_skew.unwrap_or(defaults.token_expiry_skew),
            retry: self.retry,
            circuit_breaker: self.circuit_breaker,
            rate_limit: self.rate_limit,
            cache: self.cache,
            batch: self.batch,
            enable_logging: self.enable_logging,
            enable_metrics: self.enable_metrics,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Create a new Cloud Foundry configuration builder.
pub fn cf_config() -> CfConfigBuilder {
    CfConfigBuilder::new()
}
