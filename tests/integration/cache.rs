//! Cache chain, caching policy and ETag revalidation.

use super::*;
use bytes::Bytes;
use integrations_cloudfoundry::{
    CacheBackend, CacheChain, CacheConfig, CacheEntry, CacheError, CachingPolicy, CfClient,
    HttpMethod, MemoryCache,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::Mock;

#[tokio::test]
async fn test_cache_chain_read_through() {
    let l1 = Arc::new(MemoryCache::new(10));
    let l2 = Arc::new(MemoryCache::new(10));
    let chain = CacheChain::new(vec![l1.clone(), l2.clone()]);

    let entry = CacheEntry::new(
        Bytes::from_static(b"payload"),
        Duration::from_secs(60),
        Some("\"e1\"".to_string()),
    );
    chain.set("GET:/v3/apps", entry.clone()).await.unwrap();
    assert!(l1.has("GET:/v3/apps").await);
    assert!(l2.has("GET:/v3/apps").await);

    l1.delete("GET:/v3/apps").await.unwrap();
    let found = chain.get("GET:/v3/apps").await.unwrap();
    assert_eq!(found.payload, entry.payload);
    assert_eq!(found.etag, entry.etag);
    assert!(l1.has("GET:/v3/apps").await);

    chain.delete("GET:/v3/apps").await.unwrap();
    assert!(!l1.has("GET:/v3/apps").await);
    assert!(!l2.has("GET:/v3/apps").await);
    assert!(matches!(
        chain.get("GET:/v3/apps").await,
        Err(CacheError::Miss { .. })
    ));
}

#[tokio::test]
async fn test_memory_cache_expiry_and_capacity() {
    let cache = MemoryCache::new(3);

    cache
        .set("short", CacheEntry::new("x", Duration::from_millis(10), None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let error = cache.get("short").await.unwrap_err();
    assert!(error.to_string().contains("entry expired"));

    for i in 0..10 {
        cache
            .set(&format!("k{}", i), CacheEntry::new("v", Duration::from_secs(60), None))
            .await
            .unwrap();
        assert!(cache.len() <= 3);
    }
}

#[test]
fn test_caching_policy_defaults() {
    let policy = CachingPolicy::default();

    assert!(policy.is_cacheable(HttpMethod::Get, "/v3/apps", 200));
    assert!(!policy.is_cacheable(HttpMethod::Post, "/v3/apps", 201));
    assert!(!policy.is_cacheable(HttpMethod::Get, "/v3/apps/x", 404));
    assert!(!policy.is_cacheable(HttpMethod::Get, "/v3/jobs/abc", 200));
}

#[tokio::test]
async fn test_client_revalidates_with_etag() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/apps/app-1"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/apps/app-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(json!({"guid": "app-1", "name": "web"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = unauthenticated_config(&server)
        .cache(CacheConfig {
            default_ttl: Duration::from_millis(50),
            ..Default::default()
        })
        .build()
        .unwrap();
    let client = CfClient::new(config).unwrap();

    let first: Value = client.get("/v3/apps/app-1").await.unwrap();
    // Fresh hit, no request.
    let second: Value = client.get("/v3/apps/app-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    // Stale: conditional request answered with 304.
    let third: Value = client.get("/v3/apps/app-1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(third["name"], "web");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_mutation_invalidates_cached_list() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v3/routes/r1"))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", "/v3/jobs/j1"))
        .expect(1)
        .mount(&server)
        .await;

    let config = unauthenticated_config(&server)
        .cache(CacheConfig::default())
        .build()
        .unwrap();
    let client = CfClient::new(config).unwrap();

    let _: Value = client.get("/v3/routes").await.unwrap();
    let _: Value = client.get("/v3/routes").await.unwrap();
    let job = client.delete("/v3/routes/r1").await.unwrap();
    assert_eq!(job.as_deref(), Some("/v3/jobs/j1"));
    let _: Value = client.get("/v3/routes").await.unwrap();

    let stats = client.cache_manager().unwrap().get_stats();
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_client_with_custom_backend_chain() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v3/domains"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": []})))
        .expect(1)
        .mount(&server)
        .await;

    let shared = Arc::new(MemoryCache::new(100));
    let chain = Arc::new(CacheChain::new(vec![
        Arc::new(MemoryCache::new(10)),
        shared.clone(),
    ]));

    let config = unauthenticated_config(&server)
        .cache(CacheConfig::default())
        .build()
        .unwrap();
    let client = CfClient::builder(config)
        .cache_backend(chain)
        .build()
        .unwrap();

    let _: Value = client.get("/v3/domains").await.unwrap();
    assert!(shared.has("GET:/v3/domains").await);
    let _: Value = client.get("/v3/domains").await.unwrap();
}
