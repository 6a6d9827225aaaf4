//! Cloud Foundry Error Types
//!
//! Error hierarchy for the request pipeline, token lifecycle, cache and batch
//! execution.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// CF v3 error code: resource not found.
pub const CF_RESOURCE_NOT_FOUND: i64 = 10010;
/// CF v3 error code: not authenticated.
pub const CF_NOT_AUTHENTICATED: i64 = 10002;
/// CF v3 error code: invalid auth token.
pub const CF_INVALID_AUTH_TOKEN: i64 = 1000;
/// CF v3 error code: not authorized.
pub const CF_NOT_AUTHORIZED: i64 = 10003;

/// Root error type for the Cloud Foundry integration.
#[derive(Error, Debug)]
pub enum CfError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("circuit breaker is open")]
    CircuitOpen { retry_after: Option<Duration> },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Batch operation error: {0}")]
    Batch(#[from] BatchError),

    #[error("transaction failed: operations [{}] failed", .failed_ids.join(", "))]
    TransactionFailed {
        failed_ids: Vec<String>,
        rolled_back: Vec<String>,
        not_reversible: Vec<String>,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("operation cancelled")]
    Cancelled,
}

impl CfError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CF_CONFIG",
            Self::Authentication(_) => "CF_AUTH",
            Self::Network(_) => "CF_NETWORK",
            Self::Api(_) => "CF_API",
            Self::CircuitOpen { .. } => "CF_CIRCUIT_OPEN",
            Self::Cache(_) => "CF_CACHE",
            Self::Batch(_) => "CF_BATCH",
            Self::TransactionFailed { .. } => "CF_TRANSACTION",
            Self::Protocol(_) => "CF_PROTOCOL",
            Self::Cancelled => "CF_CANCELLED",
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Api(e) => matches!(e.status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Check if error requires fresh credentials.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Authentication(AuthenticationError::TokenExpired) => true,
            Self::Api(e) => e.is_unauthorized(),
            _ => false,
        }
    }

    /// Borrow the API error, if this is one.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },
}

/// Authentication / token lifecycle error.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("no valid credentials available")]
    NoCredentials,

    #[error("access token expired")]
    TokenExpired,

    #[error("token exchange failed ({status}): {error}{}", .description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    TokenExchange {
        status: u16,
        error: String,
        description: Option<String>,
    },

    #[error("invalid token response: {message}")]
    InvalidTokenResponse { message: String },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("TLS error: {message}")]
    TlsError { message: String },
}

impl NetworkError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::TlsError { .. })
    }
}

/// REST error returned by the Cloud Controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// CF error code (e.g. 10010).
    pub code: Option<i64>,
    /// CF error title (e.g. `CF-ResourceNotFound`).
    pub title: String,
    /// Human readable detail.
    pub detail: String,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        self.code == Some(CF_RESOURCE_NOT_FOUND) || self.status == 404
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.code, Some(CF_NOT_AUTHENTICATED) | Some(CF_INVALID_AUTH_TOKEN))
            || self.status == 401
    }

    pub fn is_forbidden(&self) -> bool {
        self.code == Some(CF_NOT_AUTHORIZED) || self.status == 403
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} {} ({}): {}", self.status, self.title, code, self.detail),
            None => write!(f, "{} {}: {}", self.status, self.title, self.detail),
        }
    }
}

impl std::error::Error for ApiError {}

/// Cache error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache disabled")]
    Disabled,

    #[error("cache miss: {key}")]
    Miss { key: String },

    #[error("entry expired: {key}")]
    Expired { key: String },

    #[error("cache backend failure: {message}")]
    Backend { message: String },
}

/// Error scoped to a single batch operation.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("unsupported resource type: {resource}")]
    UnsupportedResource { resource: String },

    #[error("unsupported operation {operation} for resource type {resource}")]
    UnsupportedOperation { operation: String, resource: String },

    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("operation task failed: {message}")]
    TaskFailed { message: String },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },
}

/// Result type for Cloud Foundry operations.
pub type CfResult<T> = Result<T, CfError>;

/// OAuth2 error body from the token endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Build an authentication error from a non-2xx token endpoint response.
pub fn parse_token_error(status: u16, body: &str) -> AuthenticationError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(response) => AuthenticationError::TokenExchange {
            status,
            error: response.error,
            description: response.error_description,
        },
        Err(_) => AuthenticationError::TokenExchange {
            status,
            error: format!("HTTP {}", status),
            description: (!body.is_empty()).then(|| body.to_string()),
        },
    }
}

#[derive(serde::Deserialize)]
struct ApiErrorEnvelope {
    errors: Vec<ApiErrorItem>,
}

#[derive(serde::Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

/// Map an error response body from the Cloud Controller.
///
/// Only the first entry of the `errors` array is kept; bodies that are not a
/// CF v3 error envelope fall back to the HTTP status.
pub fn parse_api_error(status: u16, body: &[u8]) -> ApiError {
    if let Ok(envelope) = serde_json::from_slice::<ApiErrorEnvelope>(body) {
        if let Some(item) = envelope.errors.into_iter().next() {
            return ApiError {
                status,
                code: item.code,
                title: item.title,
                detail: item.detail,
            };
        }
    }

    let title = match status {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        422 => "UnprocessableEntity",
        429 => "TooManyRequests",
        500..=599 => "ServerError",
        _ => "UnexpectedStatus",
    };

    ApiError {
        status,
        code: None,
        title: title.to_string(),
        detail: String::from_utf8_lossy(body).into_owned(),
    }
}
