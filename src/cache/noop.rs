//! Disabled cache tier.

use async_trait::async_trait;

use super::{CacheBackend, CacheEntry};
use crate::error::CacheError;

/// Backend that stores nothing. Reads fail with [`CacheError::Disabled`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl NoopCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Result<CacheEntry, CacheError> {
        Err(CacheError::Disabled)
    }

    async fn set(&self, _key: &str, _entry: CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn has(&self, _key: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_noop_never_stores() {
        let cache = NoopCache::new();
        cache
            .set("k", CacheEntry::new(&b"v"[..], Duration::from_secs(60), None))
            .await
            .unwrap();
        assert!(!cache.has("k").await);
        assert_eq!(cache.get("k").await.unwrap_err(), CacheError::Disabled);
        assert!(cache.delete("k").await.is_ok());
        assert!(cache.clear().await.is_ok());
    }
}
