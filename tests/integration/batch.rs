//! Batch execution against the Cloud Controller resource registry.

use super::*;
use integrations_cloudfoundry::{
    create_batch_executor, create_batch_transaction, BatchOperation, CfClient, CfError,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::Mock;

async fn client(server: &wiremock::MockServer, concurrency: usize) -> Arc<CfClient> {
    let config = unauthenticated_config(server)
        .no_retry()
        .batch_concurrency(concurrency)
        .build()
        .unwrap();
    Arc::new(CfClient::new(config).unwrap())
}

#[tokio::test]
async fn test_batch_get_preserves_order_and_calls_back() {
    let server = setup_mock_server().await;

    for guid in ["guid-1", "guid-2"] {
        Mock::given(method("GET"))
            .and(path(format!("/v3/apps/{}", guid)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"guid": guid}))
                    .set_delay(Duration::from_millis(if guid == "guid-1" { 40 } else { 5 })),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let executor = create_batch_executor(client(&server, 2).await);
    assert_eq!(executor.concurrency(), 2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let operations = ["guid-1", "guid-2"]
        .iter()
        .enumerate()
        .map(|(i, guid)| {
            let seen = seen.clone();
            BatchOperation::get(format!("op-{}", i + 1), "app", guid)
                .with_callback(move |result| seen.lock().push(result.id.clone()))
        })
        .collect();

    let results = executor
        .execute(&CancellationToken::new(), operations)
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "op-1");
    assert_eq!(results[1].id, "op-2");
    assert_eq!(results[0].resource_guid(), Some("guid-1"));
    assert_eq!(results[1].resource_guid(), Some("guid-2"));
    assert!(results.iter().all(|r| r.success && !r.duration.is_zero()));

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["op-1".to_string(), "op-2".to_string()]);
}

#[tokio::test]
async fn test_batch_errors_stay_per_operation() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/spaces/missing"))
        .respond_with(cf_error(404, 10010, "CF-ResourceNotFound", "Space not found"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/organizations/org-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"guid": "org-1"})))
        .mount(&server)
        .await;

    let executor = create_batch_executor(client(&server, 3).await);
    let results = executor
        .execute(
            &CancellationToken::new(),
            vec![
                BatchOperation::get("1", "space", "missing"),
                BatchOperation::get("2", "organization", "org-1"),
                BatchOperation::create("3", "stack", json!({"name": "cflinuxfs4"})),
            ],
        )
        .await;

    assert!(!results[0].success);
    assert!(results[0]
        .error
        .as_ref()
        .and_then(CfError::as_api_error)
        .map(|e| e.is_not_found())
        .unwrap_or(false));
    assert!(results[1].success);
    assert!(results[2]
        .error
        .as_ref()
        .map(|e| e.to_string().contains("unsupported operation create"))
        .unwrap_or(false));
}

#[tokio::test]
async fn test_transaction_rolls_back_created_resources() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/v3/apps"))
        .and(body_json(json!({"name": "web"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"guid": "app-1", "name": "web"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v3/routes"))
        .respond_with(cf_error(422, 10008, "CF-UnprocessableEntity", "Route already exists"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v3/apps/app-1"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let transaction = create_batch_transaction(client(&server, 2).await);
    let outcome = transaction
        .execute(
            &CancellationToken::new(),
            vec![
                BatchOperation::create("app", "app", json!({"name": "web"})),
                BatchOperation::create("route", "route", json!({"host": "web"})),
            ],
        )
        .await;

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.rolled_back, vec!["app".to_string()]);
    assert!(outcome.rollback_failures.is_empty());

    match outcome.error {
        Some(CfError::TransactionFailed { failed_ids, .. }) => {
            assert_eq!(failed_ids, vec!["route".to_string()]);
        }
        other => panic!("expected transaction failure, got {:?}", other),
    }
}
