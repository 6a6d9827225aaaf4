//! Retry, circuit breaking and metrics through a real transport.

use super::*;
use integrations_cloudfoundry::{CfClient, CfError, CircuitBreakerConfig, CircuitState};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::Mock;

#[tokio::test]
async fn test_retry_until_success() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/info"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "cc"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = CfClient::new(unauthenticated_config(&server).build().unwrap()).unwrap();

    let info: Value = client.get("/v3/info").await.unwrap();
    assert_eq!(info["name"], "cc");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_retry_honours_retry_after() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/apps"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .mount(&server)
        .await;

    let client = CfClient::new(unauthenticated_config(&server).build().unwrap()).unwrap();
    assert_ok!(client.get::<Value>("/v3/apps").await);
}

#[tokio::test]
async fn test_api_error_details() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/apps/missing"))
        .respond_with(cf_error(404, 10010, "CF-ResourceNotFound", "App not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = CfClient::new(unauthenticated_config(&server).build().unwrap()).unwrap();
    let error = assert_err!(client.get::<Value>("/v3/apps/missing").await);

    let api = error.as_api_error().unwrap();
    assert_eq!(api.status, 404);
    assert_eq!(api.code, Some(10010));
    assert_eq!(api.title, "CF-ResourceNotFound");
    assert_eq!(api.detail, "App not found");
    assert!(api.is_not_found());
}

#[tokio::test]
async fn test_circuit_breaker_sequence() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/apps"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = unauthenticated_config(&server)
        .no_retry()
        .circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            open_duration: Duration::from_millis(100),
        })
        .build()
        .unwrap();
    let client = CfClient::new(config).unwrap();

    for _ in 0..2 {
        assert_err!(client.get::<Value>("/v3/apps").await);
    }

    let error = client.get::<Value>("/v3/apps").await.unwrap_err();
    assert!(matches!(error, CfError::CircuitOpen { .. }));
    assert!(error.to_string().contains("circuit breaker is open"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v3/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .mount(&server)
        .await;

    assert_ok!(client.get::<Value>("/v3/apps").await);
    let breaker = client.circuit_breaker().unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.get_stats().rejected_requests, 1);
}

#[tokio::test]
async fn test_metrics_observer() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/spaces"))
        .and(query_param("names", "dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .mount(&server)
        .await;

    let client = CfClient::new(unauthenticated_config(&server).build().unwrap()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();
    client
        .metrics()
        .add_observer(move |endpoint, metrics| {
            observed.lock().push((endpoint.to_string(), metrics.total_requests));
        });

    for _ in 0..2 {
        let _: Value = client
            .get_with_params("/v3/spaces", &[("names", "dev")])
            .await
            .unwrap();
    }

    assert_eq!(
        *seen.lock(),
        vec![
            ("GET /v3/spaces".to_string(), 1),
            ("GET /v3/spaces".to_string(), 2),
        ]
    );
    assert_eq!(client.metrics().get("GET /v3/spaces").unwrap().total_errors, 0);
}

#[tokio::test]
async fn test_default_and_custom_headers() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/v3/spaces"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json"))
        .and(header("x-correlation-id", "abc"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"guid": "space-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = unauthenticated_config(&server)
        .header("X-Correlation-Id", "abc")
        .build()
        .unwrap();
    let client = CfClient::new(config).unwrap();

    let created: Value = client
        .post("/v3/spaces", &json!({"name": "dev"}))
        .await
        .unwrap();
    assert_eq!(created["guid"], "space-1");
}

#[tokio::test]
async fn test_rate_limited_client() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/stacks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .expect(3)
        .mount(&server)
        .await;

    let config = unauthenticated_config(&server)
        .rate_limit(50)
        .build()
        .unwrap();
    let client = CfClient::new(config).unwrap();

    for _ in 0..3 {
        assert_ok!(client.get::<Value>("/v3/stacks").await);
    }
    assert_eq!(client.rate_limiter().unwrap().get_stats().allowed_requests, 3);
}
