//! Response caching.
//!
//! The request phase serves fresh hits without touching the network and adds
//! `If-None-Match` when only a validator is left. The response phase stores
//! cacheable responses, answers `304 Not Modified` from the validator and
//! invalidates the resource collection after a successful mutation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CachedResponse, Request, RequestInterceptor, Response, ResponseInterceptor};
use crate::cache::{invalidation_prefix, CacheEntry, CacheManager, CachingPolicy};
use crate::error::CfResult;

/// Cache lookup performed for a request.
#[derive(Debug, Clone)]
struct CacheLookup {
    key: String,
    validator: Option<CacheEntry>,
}

/// Headers replayed with a cached payload.
fn entry_headers(entry: &CacheEntry) -> HashMap<String, String> {
    let content_type = entry
        .content_type
        .clone()
        .unwrap_or_else(|| "application/json".to_string());
    [("content-type".to_string(), content_type)].into_iter().collect()
}

pub struct CacheRequestInterceptor {
    manager: Arc<CacheManager>,
    policy: CachingPolicy,
}

impl CacheRequestInterceptor {
    pub fn new(manager: Arc<CacheManager>, policy: CachingPolicy) -> Self {
        Self { manager, policy }
    }
}

#[async_trait]
impl RequestInterceptor for CacheRequestInterceptor {
    async fn intercept(&self, request: &mut Request) -> CfResult<()> {
        if !self.policy.is_cacheable_request(request.method, &request.path) {
            return Ok(());
        }

        let key = self.manager.key(request.method, &request.path, &request.query);

        if let Ok(entry) = self.manager.get_entry(&key).await {
            tracing::debug!(key = %key, status = entry.status, "Cache hit");
            request.short_circuit(CachedResponse {
                status: entry.status,
                headers: entry_headers(&entry),
                body: entry.payload,
            });
            return Ok(());
        }

        let validator = self.manager.validator(&key).await;
        if let Some(etag) = validator.as_ref().and_then(|v| v.etag.as_deref()) {
            if request.header("if-none-match").is_none() {
                request.set_header("if-none-match", etag);
            }
        }

        request.extensions.insert(CacheLookup { key, validator });
        Ok(())
    }

    fn name(&self) -> &str {
        "cache"
    }
}

pub struct CacheResponseInterceptor {
    manager: Arc<CacheManager>,
    policy: CachingPolicy,
}

impl CacheResponseInterceptor {
    pub fn new(manager: Arc<CacheManager>, policy: CachingPolicy) -> Self {
        Self { manager, policy }
    }
}

#[async_trait]
impl ResponseInterceptor for CacheResponseInterceptor {
    async fn intercept(&self, request: &Request, response: &mut Response) -> CfResult<()> {
        if response.from_cache || response.error.is_some() {
            return Ok(());
        }

        if request.method.is_mutating() && (200..300).contains(&response.status) {
            self.manager
                .invalidate_prefix(&invalidation_prefix(&request.path))
                .await;
        }

        let Some(lookup) = request.extensions.get::<CacheLookup>() else {
            return Ok(());
        };

        if response.status == 304 {
            if let Some(validator) = &lookup.validator {
                tracing::debug!(key = %lookup.key, "Not modified, serving validated entry");
                response.status = validator.status;
                response.body = validator.payload.clone();
                response.headers.extend(entry_headers(validator));

                if let Err(e) = self
                    .manager
                    .set_response(
                        &lookup.key,
                        validator.status,
                        validator.content_type.clone(),
                        validator.payload.clone(),
                        validator.etag.clone(),
                    )
                    .await
                {
                    tracing::warn!(key = %lookup.key, error = %e, "Cache store failed");
                }
            }
            return Ok(());
        }

        if !self
            .policy
            .is_cacheable(request.method, &request.path, response.status)
        {
            return Ok(());
        }

        let stored = self
            .manager
            .set_response(
                &lookup.key,
                response.status,
                response.header("content-type").map(str::to_string),
                response.body.clone(),
                response.header("etag").map(str::to_string),
            )
            .await;
        if let Err(e) = stored {
            tracing::warn!(key = %lookup.key, error = %e, "Cache store failed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cache"
    }
}
