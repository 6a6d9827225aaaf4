//! Cache manager.
//!
//! Derives request keys, tracks hit/miss counters and keeps ETag validators
//! next to the cached payloads.
//!
//! Every stored key is recorded in an index so prefix invalidation can find
//! it. The index only forgets a key once the backend no longer holds either
//! its payload or its validator.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CacheBackend, CacheEntry};
use crate::core::HttpMethod;
use crate::error::CacheError;

const ETAG_KEY_PREFIX: &str = "etag|";
/// Index size that triggers the first sweep of keys the backend dropped.
const MIN_SWEEP_THRESHOLD: usize = 1024;

/// Cache key: `METHOD:PATH` or `METHOD:PATH:<sorted, form-encoded params>`.
pub fn cache_key(method: HttpMethod, path: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return format!("{}:{}", method.as_str(), path);
    }

    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("{}:{}:{}", method.as_str(), path, encoded)
}

/// Resource collection a path belongs to, used to scope invalidation.
///
/// `/v3/apps/123/env` gives `/v3/apps`; a path without a version segment
/// keeps only its first segment.
pub fn invalidation_prefix(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let is_version = |s: &str| {
        s.len() > 1 && s.starts_with('v') && s[1..].chars().all(|c| c.is_ascii_digit())
    };

    let take = match segments.first() {
        Some(first) if is_version(first) => 2,
        Some(_) => 1,
        None => 0,
    };

    format!("/{}", segments.into_iter().take(take).collect::<Vec<_>>().join("/"))
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Stored keys with the sequence number of their latest write.
#[derive(Debug)]
struct KeyIndex {
    keys: HashMap<String, u64>,
    next_seq: u64,
    sweep_at: usize,
}

impl KeyIndex {
    fn new() -> Self {
        Self {
            keys: HashMap::new(),
            next_seq: 0,
            sweep_at: MIN_SWEEP_THRESHOLD,
        }
    }

    /// Record a write; returns true when the index has grown enough to sweep.
    fn record(&mut self, key: &str) -> bool {
        self.next_seq += 1;
        self.keys.insert(key.to_string(), self.next_seq);
        self.keys.len() >= self.sweep_at
    }
}

/// Cache manager over one backend.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    etag_ttl: Duration,
    index: Mutex<KeyIndex>,
    sweeping: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
            etag_ttl: default_ttl.saturating_mul(12),
            index: Mutex::new(KeyIndex::new()),
            sweeping: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Set how long ETag validators outlive their payloads.
    pub fn with_etag_ttl(mut self, ttl: Duration) -> Self {
        self.etag_ttl = ttl;
        self
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Key for a request.
    pub fn key(&self, method: HttpMethod, path: &str, params: &BTreeMap<String, String>) -> String {
        cache_key(method, path, params)
    }

    /// Store a payload with the default TTL.
    pub async fn set(&self, key: &str, payload: Bytes) -> Result<(), CacheError> {
        self.set_with_ttl(key, payload, self.default_ttl).await
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        payload: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.backend.set(key, CacheEntry::new(payload, ttl, None)).await?;
        self.track(key).await;
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Store a payload together with its ETag. The validator is kept for the
    /// longer ETag TTL so a later `304 Not Modified` can be answered from it.
    pub async fn set_with_etag(
        &self,
        key: &str,
        payload: Bytes,
        etag: impl Into<String>,
    ) -> Result<(), CacheError> {
        self.set_response(key, 200, None, payload, Some(etag.into()))
            .await
    }

    /// Store a response as received: status, content type, payload and an
    /// optional ETag.
    pub async fn set_response(
        &self,
        key: &str,
        status: u16,
        content_type: Option<String>,
        payload: Bytes,
        etag: Option<String>,
    ) -> Result<(), CacheError> {
        let entry = |ttl| {
            CacheEntry::new(payload.clone(), ttl, etag.clone())
                .with_status(status)
                .with_content_type(content_type.clone())
        };

        if etag.is_some() {
            self.backend.set(&etag_key(key), entry(self.etag_ttl)).await?;
        }
        self.backend.set(key, entry(self.default_ttl)).await?;

        self.track(key).await;
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Fresh payload for `key`.
    pub async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        self.get_entry(key).await.map(|entry| entry.payload)
    }

    /// Fresh entry for `key`, with the status it was stored under.
    pub async fn get_entry(&self, key: &str) -> Result<CacheEntry, CacheError> {
        match self.backend.get(key).await {
            Ok(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(entry)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// ETag validator (with its payload) recorded for `key`, even when the
    /// payload itself has expired.
    pub async fn validator(&self, key: &str) -> Option<CacheEntry> {
        self.backend
            .get(&etag_key(key))
            .await
            .ok()
            .filter(|entry| entry.etag.is_some())
    }

    /// Remove a key and its validator.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.index.lock().keys.remove(key);
        let payload = self.backend.delete(key).await;
        let validator = self.backend.delete(&etag_key(key)).await;
        payload.and(validator)
    }

    /// Remove every tracked key whose path lies under `prefix`. Returns the
    /// number of keys removed.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let matching: Vec<String> = self
            .index
            .lock()
            .keys
            .keys()
            .filter(|key| key_path(key).map(|p| path_under(p, prefix)).unwrap_or(false))
            .cloned()
            .collect();

        for key in &matching {
            if let Err(e) = self.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
            }
        }

        if !matching.is_empty() {
            tracing::debug!(prefix, removed = matching.len(), "Cache invalidated");
        }
        matching.len()
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.index.lock().keys.clear();
        self.backend.clear().await
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        self.get_stats().hit_rate()
    }

    /// Number of keys currently reachable by invalidation.
    pub fn tracked_keys(&self) -> usize {
        self.index.lock().keys.len()
    }

    async fn track(&self, key: &str) {
        let sweep = self.index.lock().record(key);
        if sweep && !self.sweeping.swap(true, Ordering::AcqRel) {
            self.sweep().await;
            self.sweeping.store(false, Ordering::Release);
        }
    }

    /// Forget keys whose payload and validator are both gone from the
    /// backend. A key rewritten during the sweep is kept.
    async fn sweep(&self) {
        let snapshot: Vec<(String, u64)> = self
            .index
            .lock()
            .keys
            .iter()
            .map(|(key, seq)| (key.clone(), *seq))
            .collect();

        let mut gone = Vec::new();
        for (key, seq) in snapshot {
            if !self.backend.has(&key).await && !self.backend.has(&etag_key(&key)).await {
                gone.push((key, seq));
            }
        }

        let mut index = self.index.lock();
        for (key, seq) in &gone {
            if index.keys.get(key) == Some(seq) {
                index.keys.remove(key);
            }
        }
        index.sweep_at = (index.keys.len() * 2).max(MIN_SWEEP_THRESHOLD);
        tracing::debug!(
            forgotten = gone.len(),
            tracked = index.keys.len(),
            "Cache key index swept"
        );
    }
}

fn etag_key(key: &str) -> String {
    format!("{}{}", ETAG_KEY_PREFIX, key)
}

fn key_path(key: &str) -> Option<&str> {
    let rest = key.split_once(':')?.1;
    Some(rest.split_once(':').map(|(path, _)| path).unwrap_or(rest))
}

fn path_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(MemoryCache::new(100)), Duration::from_secs(60))
    }

    #[test]
    fn test_cache_key_format() {
        let mut params = BTreeMap::new();
        assert_eq!(cache_key(HttpMethod::Get, "/v3/apps", &params), "GET:/v3/apps");

        params.insert("per_page".to_string(), "50".to_string());
        params.insert("names".to_string(), "my app".to_string());
        assert_eq!(
            cache_key(HttpMethod::Get, "/v3/apps", &params),
            "GET:/v3/apps:names=my+app&per_page=50"
        );
    }

    #[test]
    fn test_invalidation_prefix() {
        assert_eq!(invalidation_prefix("/v3/apps/123/env"), "/v3/apps");
        assert_eq!(invalidation_prefix("/v3/apps"), "/v3/apps");
        assert_eq!(invalidation_prefix("/internal/things/1"), "/internal");
        assert_eq!(invalidation_prefix("/"), "/");
    }

    #[tokio::test]
    async fn test_get_counts_hits_and_misses() {
        let cache = manager();
        cache.set("GET:/v3/apps", Bytes::from_static(b"[]")).await.unwrap();

        assert_eq!(cache.get("GET:/v3/apps").await.unwrap(), Bytes::from_static(b"[]"));
        assert!(cache.get("GET:/v3/spaces").await.is_err());

        let stats = cache.get_stats();
        assert_eq!(stats, CacheStats { hits: 1, misses: 1, sets: 1 });
        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_etag_validator_outlives_payload() {
        let cache = CacheManager::new(Arc::new(MemoryCache::new(100)), Duration::from_millis(20))
            .with_etag_ttl(Duration::from_secs(60));
        cache
            .set_with_etag("GET:/v3/apps/1", Bytes::from_static(b"{}"), "\"abc\"")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("GET:/v3/apps/1").await.is_err());

        let validator = cache.validator("GET:/v3/apps/1").await.unwrap();
        assert_eq!(validator.etag.as_deref(), Some("\"abc\""));
        assert_eq!(validator.payload, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = manager();
        cache.set("GET:/v3/apps", Bytes::from_static(b"[]")).await.unwrap();
        cache
            .set_with_etag("GET:/v3/apps/1:include=space", Bytes::from_static(b"{}"), "\"e\"")
            .await
            .unwrap();
        cache.set("GET:/v3/spaces", Bytes::from_static(b"[]")).await.unwrap();

        assert_eq!(cache.invalidate_prefix("/v3/apps").await, 2);
        assert!(cache.get("GET:/v3/apps").await.is_err());
        assert!(cache.validator("GET:/v3/apps/1:include=space").await.is_none());
        assert!(cache.get("GET:/v3/spaces").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_reaches_every_stored_key() {
        let cache = CacheManager::new(Arc::new(MemoryCache::new(20_000)), Duration::from_secs(60));
        for i in 0..10_001 {
            cache
                .set(&format!("GET:/v3/apps/{}", i), Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }

        assert_eq!(cache.invalidate_prefix("/v3/apps").await, 10_001);
        assert!(!cache.backend().has("GET:/v3/apps/0").await);
        assert_eq!(cache.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_index_forgets_keys_the_backend_evicted() {
        let cache = CacheManager::new(Arc::new(MemoryCache::new(10)), Duration::from_secs(60));
        for i in 0..5_000 {
            cache
                .set(&format!("GET:/v3/spaces/{}", i), Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }

        assert!(cache.tracked_keys() < MIN_SWEEP_THRESHOLD);
        assert!(cache.backend().has("GET:/v3/spaces/4990").await);

        cache.invalidate_prefix("/v3/spaces").await;
        for i in 4_990..5_000 {
            assert!(!cache.backend().has(&format!("GET:/v3/spaces/{}", i)).await);
        }
        assert_eq!(cache.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_set_response_keeps_status() {
        let cache = manager();
        cache
            .set_response(
                "GET:/v3/apps/none",
                404,
                Some("application/json".to_string()),
                Bytes::from_static(b"{\"errors\":[]}"),
                None,
            )
            .await
            .unwrap();

        let entry = cache.get_entry("GET:/v3/apps/none").await.unwrap();
        assert_eq!(entry.status, 404);
        assert_eq!(entry.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_huge_default_ttl_does_not_overflow() {
        let cache = CacheManager::new(Arc::new(MemoryCache::new(1)), Duration::MAX);
        assert_eq!(cache.default_ttl(), Duration::MAX);
    }
}
