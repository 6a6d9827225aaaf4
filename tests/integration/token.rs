//! Grant exchange against a mock token endpoint.

use super::*;
use base64::Engine;
use integrations_cloudfoundry::{
    create_token_manager, CfClient, DefaultTokenManager, GrantStrategy, ReqwestHttpTransport,
    TokenManager,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::Mock;

fn basic(id: &str, secret: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", id, secret))
    )
}

fn transport() -> Arc<ReqwestHttpTransport> {
    Arc::new(ReqwestHttpTransport::new().unwrap())
}

#[tokio::test]
async fn test_client_credentials_grant() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("authorization", basic("client-id", "client-secret").as_str()))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(token_response("client-token"))
        .expect(1)
        .mount(&server)
        .await;

    let config = cf_config()
        .api_endpoint(server.uri())
        .token_endpoint(token_url(&server))
        .client_credentials("client-id", "client-secret")
        .build()
        .unwrap();

    let manager = DefaultTokenManager::new(config.token_manager_config(), transport());
    assert_eq!(manager.strategy(), Some(GrantStrategy::ClientCredentials));

    let cancel = CancellationToken::new();
    assert_eq!(manager.get_token(&cancel).await.unwrap(), "client-token");
    // Second call is served from the cached token.
    assert_eq!(manager.get_token(&cancel).await.unwrap(), "client-token");
}

#[tokio::test]
async fn test_password_grant_uses_default_client() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("authorization", basic("cf", "").as_str()))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=admin"))
        .and(body_string_contains("password=p%40ss"))
        .respond_with(token_response("user-token"))
        .expect(1)
        .mount(&server)
        .await;

    let config = cf_config()
        .api_endpoint(server.uri())
        .token_endpoint(token_url(&server))
        .password_credentials("admin", "p@ss")
        .build()
        .unwrap();

    let manager = create_token_manager(config.token_manager_config(), transport());
    assert_eq!(
        manager.get_token(&CancellationToken::new()).await.unwrap(),
        "user-token"
    );
}

#[tokio::test]
async fn test_no_credentials() {
    let server = setup_mock_server().await;

    let config = cf_config()
        .api_endpoint(server.uri())
        .token_endpoint(token_url(&server))
        .build()
        .unwrap();

    let manager = create_token_manager(config.token_manager_config(), transport());
    let error = manager
        .get_token(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(error.to_string().contains("no valid credentials available"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_endpoint_error_is_surfaced() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "unauthorized",
            "error_description": "Bad credentials"
        })))
        .mount(&server)
        .await;

    let config = cf_config()
        .api_endpoint(server.uri())
        .token_endpoint(token_url(&server))
        .client_credentials("client-id", "wrong")
        .build()
        .unwrap();

    let manager = create_token_manager(config.token_manager_config(), transport());
    let message = manager
        .get_token(&CancellationToken::new())
        .await
        .unwrap_err()
        .to_string();

    assert!(message.contains("unauthorized"));
    assert!(message.contains("Bad credentials"));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_exchange() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response("shared").set_delay(Duration::from_millis(50)))
        .expect(1)
        .mount(&server)
        .await;

    let config = cf_config()
        .api_endpoint(server.uri())
        .token_endpoint(token_url(&server))
        .client_credentials("client-id", "client-secret")
        .build()
        .unwrap();

    let manager = create_token_manager(config.token_manager_config(), transport());
    let calls = (0..10).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_token(&CancellationToken::new()).await })
    });

    for handle in futures::future::join_all(calls).await {
        assert_eq!(handle.unwrap().unwrap(), "shared");
    }
}

#[tokio::test]
async fn test_client_attaches_bearer_token() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response("client-token"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/apps"))
        .and(header("authorization", "Bearer client-token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pagination": {"total_results": 0, "total_pages": 1, "next": null},
            "resources": []
        })))
        .expect(2)
        .mount(&server)
        .await;

    let config = cf_config()
        .api_endpoint(server.uri())
        .token_endpoint(token_url(&server))
        .client_credentials("client-id", "client-secret")
        .build()
        .unwrap();
    let client = CfClient::new(config).unwrap();

    for _ in 0..2 {
        let apps: Vec<Value> = client.list_all("/v3/apps", &[]).await.unwrap();
        assert!(apps.is_empty());
    }
}
