//! Response Cache
//!
//! Pluggable key/value store for response payloads with TTL and ETag, plus the
//! manager, multi-tier chain and caching policy built on top of it.

pub mod chain;
pub mod manager;
pub mod memory;
pub mod noop;
pub mod policy;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::{Duration, Instant};

use crate::error::CacheError;

pub use chain::CacheChain;
pub use manager::{cache_key, invalidation_prefix, CacheManager, CacheStats};
pub use memory::MemoryCache;
pub use noop::NoopCache;
pub use policy::CachingPolicy;

/// Longest TTL an entry can be given; larger values are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// A cached payload, with the status and content type it was served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub expires_at: Instant,
    pub etag: Option<String>,
    pub status: u16,
    pub content_type: Option<String>,
}

impl CacheEntry {
    /// Entry that expires `ttl` from now. Status defaults to 200.
    pub fn new(payload: impl Into<Bytes>, ttl: Duration, etag: Option<String>) -> Self {
        let now = Instant::now();
        Self {
            payload: payload.into(),
            expires_at: now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now),
            etag,
            status: 200,
            content_type: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before expiry.
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Cache storage backend.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a fresh entry. Expired entries fail with [`CacheError::Expired`].
    async fn get(&self, key: &str) -> Result<CacheEntry, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    /// Whether a fresh entry exists.
    async fn has(&self, key: &str) -> bool;
}
