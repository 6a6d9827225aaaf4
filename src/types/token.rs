//! Token Types
//!
//! Bearer token and token endpoint response definitions.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Token response from the token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// A bearer token.
///
/// Tokens are replaced wholesale on refresh and never mutated in place.
#[derive(Clone)]
pub struct Token {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
    token_type: String,
}

impl Token {
    /// Create a new token.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        token_type: impl Into<String>,
    ) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: refresh_token.map(SecretString::new),
            expires_at,
            token_type: token_type.into(),
        }
    }

    /// Build a token from a grant response received at `received_at`.
    ///
    /// An `expires_in` too large to represent is treated as no expiry.
    pub fn from_response(response: TokenResponse, received_at: DateTime<Utc>) -> Self {
        let expires_at = response.expires_in.and_then(|secs| {
            i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| received_at.checked_add_signed(lifetime))
        });

        Self::new(
            response.access_token,
            response.refresh_token,
            expires_at,
            response.token_type,
        )
    }

    /// Build a token from a raw access token string.
    ///
    /// When the value is a JWT its `exp` claim becomes the expiry; otherwise
    /// the token has no known expiry.
    pub fn from_access_token(value: &str) -> Self {
        let value = value
            .strip_prefix("bearer ")
            .or_else(|| value.strip_prefix("Bearer "))
            .unwrap_or(value);
        Self::new(value, None, jwt_expiry(value), "bearer")
    }

    /// Access token value (for the Authorization header).
    pub fn secret(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Refresh token value, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret().as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// A token is valid while `now < expiry - skew`. Tokens without an expiry
    /// are always valid.
    pub fn is_valid(&self, skew: std::time::Duration) -> bool {
        self.is_valid_at(Utc::now(), skew)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: std::time::Duration) -> bool {
        match self.expires_at {
            Some(exp) => {
                let skew = Duration::from_std(skew).unwrap_or_else(|_| Duration::zero());
                exp.checked_sub_signed(skew).map_or(false, |deadline| now < deadline)
            }
            None => true,
        }
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying it.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&decoded).ok()?;
    DateTime::from_timestamp(claim.exp?, 0)
}
