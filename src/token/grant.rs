//! Grant Selection
//!
//! Picks the grant strategy from the configured credential material and
//! performs the form-encoded exchange against the UAA token endpoint.

use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{parse_token_error, AuthenticationError, CfResult, ConfigurationError};
use crate::types::{Credentials, Token, TokenResponse};

/// Client id used for user grants when no client is configured.
pub const DEFAULT_CLIENT_ID: &str = "cf";

/// OAuth2 grant sent to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// How the token manager obtains tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantStrategy {
    /// Use the configured access token; once it expires or is rejected, run
    /// the password grant.
    StaticTokenWithPasswordFallback,
    /// Use the configured access token; refresh it with the refresh token
    /// grant when one is available.
    StaticToken,
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantStrategy {
    /// Select the strategy for `credentials`, first match wins:
    ///
    /// 1. access token + username + password
    /// 2. access token
    /// 3. client id + client secret
    /// 4. username + password
    /// 5. refresh token
    pub fn select(credentials: &Credentials) -> Option<Self> {
        let has_password = credentials.username.is_some() && credentials.password.is_some();

        if credentials.access_token.is_some() {
            if has_password {
                return Some(Self::StaticTokenWithPasswordFallback);
            }
            return Some(Self::StaticToken);
        }
        if credentials.client_id.is_some() && credentials.client_secret.is_some() {
            return Some(Self::ClientCredentials);
        }
        if has_password {
            return Some(Self::Password);
        }
        if credentials.refresh_token.is_some() {
            return Some(Self::RefreshToken);
        }
        None
    }

    /// Whether the strategy starts from a configured access token.
    pub fn uses_static_token(&self) -> bool {
        matches!(self, Self::StaticTokenWithPasswordFallback | Self::StaticToken)
    }

    /// Grant to run when no usable token is held.
    pub fn exchange_grant(&self, has_refresh_token: bool) -> Option<GrantType> {
        match self {
            Self::StaticTokenWithPasswordFallback | Self::Password => Some(GrantType::Password),
            Self::ClientCredentials => Some(GrantType::ClientCredentials),
            Self::StaticToken | Self::RefreshToken => {
                has_refresh_token.then_some(GrantType::RefreshToken)
            }
        }
    }
}

/// Build the token endpoint request for `grant`.
///
/// `refresh_token` is the most recent refresh token, which may have been
/// rotated since configuration.
pub fn build_grant_request(
    grant: GrantType,
    credentials: &Credentials,
    refresh_token: Option<&str>,
    timeout: Duration,
) -> CfResult<HttpRequest> {
    let url = credentials
        .token_endpoint
        .clone()
        .ok_or_else(|| missing("token_endpoint"))?;

    let mut form: Vec<(&str, String)> = vec![("grant_type", grant.as_str().to_string())];
    match grant {
        GrantType::ClientCredentials => {}
        GrantType::Password => {
            let username = credentials.username.clone().ok_or_else(|| missing("username"))?;
            let password = credentials
                .password
                .as_ref()
                .ok_or_else(|| missing("password"))?;
            form.push(("username", username));
            form.push(("password", password.expose_secret().to_string()));
        }
        GrantType::RefreshToken => {
            let token = refresh_token.ok_or_else(|| missing("refresh_token"))?;
            form.push(("refresh_token", token.to_string()));
        }
    }

    let body = serde_urlencoded::to_string(&form).map_err(|e| {
        crate::error::CfError::from(ConfigurationError::InvalidConfig {
            message: format!("cannot encode token request: {}", e),
        })
    })?;

    let mut headers = HashMap::new();
    headers.insert(
        "content-type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    );
    headers.insert("accept".to_string(), "application/json".to_string());
    headers.insert(
        "authorization".to_string(),
        basic_auth(grant, credentials)?,
    );

    Ok(HttpRequest {
        method: HttpMethod::Post,
        url,
        headers,
        body: Some(Bytes::from(body)),
        timeout: Some(timeout),
    })
}

/// Send a grant request and turn the response into a [`Token`].
pub async fn exchange<T>(transport: &T, request: HttpRequest) -> CfResult<Token>
where
    T: HttpTransport + ?Sized,
{
    let response = transport.send(request).await?;
    let received_at = Utc::now();

    if !response.is_success() {
        let body = String::from_utf8_lossy(&response.body);
        return Err(parse_token_error(response.status, &body).into());
    }

    let token_response: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
        AuthenticationError::InvalidTokenResponse {
            message: e.to_string(),
        }
    })?;

    if token_response.access_token.is_empty() {
        return Err(AuthenticationError::InvalidTokenResponse {
            message: "empty access_token".to_string(),
        }
        .into());
    }

    Ok(Token::from_response(token_response, received_at))
}

fn basic_auth(grant: GrantType, credentials: &Credentials) -> CfResult<String> {
    let (client_id, client_secret) = match grant {
        GrantType::ClientCredentials => (
            credentials.client_id.clone().ok_or_else(|| missing("client_id"))?,
            credentials
                .client_secret
                .as_ref()
                .map(|s| s.expose_secret().to_string())
                .ok_or_else(|| missing("client_secret"))?,
        ),
        GrantType::Password | GrantType::RefreshToken => match &credentials.client_id {
            Some(id) => (
                id.clone(),
                credentials
                    .client_secret
                    .as_ref()
                    .map(|s| s.expose_secret().to_string())
                    .unwrap_or_default(),
            ),
            None => (DEFAULT_CLIENT_ID.to_string(), String::new()),
        },
    };

    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", client_id, client_secret));
    Ok(format!("Basic {}", encoded))
}

fn missing(field: &str) -> crate::error::CfError {
    ConfigurationError::MissingRequired {
        field: field.to_string(),
    }
    .into()
}
