//! Integration tests using WireMock
//!
//! These tests drive the full pipeline against a mock Cloud Controller and
//! token endpoint: grant exchange, interceptors, retry, caching and batches.

mod batch;
mod cache;
mod pipeline;
mod token;

use integrations_cloudfoundry::{cf_config, CfConfigBuilder, RetryConfig};
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

/// Start a mock server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Config builder pointed at the mock server, with fast retries and no
/// authentication.
pub fn unauthenticated_config(server: &MockServer) -> CfConfigBuilder {
    cf_config()
        .api_endpoint(server.uri())
        .skip_auth(true)
        .retry(RetryConfig::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(50),
        ))
}

/// Token endpoint URL on the mock server.
pub fn token_url(server: &MockServer) -> String {
    format!("{}/oauth/token", server.uri())
}

/// Successful token endpoint response.
pub fn token_response(access_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
    }))
}

/// Cloud Controller error envelope.
pub fn cf_error(status: u16, code: i64, title: &str, detail: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "errors": [{ "code": code, "title": title, "detail": detail }]
    }))
}
