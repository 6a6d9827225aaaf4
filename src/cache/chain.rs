//! Multi-tier cache.

use async_trait::async_trait;
use std::sync::Arc;

use super::{CacheBackend, CacheEntry};
use crate::error::CacheError;

/// Ordered list of cache tiers, L1 first.
///
/// Reads probe tiers in order and copy a lower-tier hit into every tier above
/// it before returning. Writes go to every tier; the last error seen is
/// reported after all tiers were attempted.
#[derive(Clone, Default)]
pub struct CacheChain {
    tiers: Vec<Arc<dyn CacheBackend>>,
}

impl CacheChain {
    pub fn new(tiers: Vec<Arc<dyn CacheBackend>>) -> Self {
        Self { tiers }
    }

    /// Append a lower tier.
    pub fn with_tier(mut self, tier: Arc<dyn CacheBackend>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}

#[async_trait]
impl CacheBackend for CacheChain {
    async fn get(&self, key: &str) -> Result<CacheEntry, CacheError> {
        let mut last_error = CacheError::Disabled;

        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(entry) => {
                    for upper in &self.tiers[..index] {
                        if let Err(e) = upper.set(key, entry.clone()).await {
                            tracing::warn!(key, error = %e, "Cache back-fill failed");
                        }
                    }
                    if index > 0 {
                        tracing::trace!(key, tier = index, "Cache hit on lower tier");
                    }
                    return Ok(entry);
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut result = Ok(());
        for tier in &self.tiers {
            if let Err(e) = tier.set(key, entry.clone()).await {
                result = Err(e);
            }
        }
        result
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut result = Ok(());
        for tier in &self.tiers {
            if let Err(e) = tier.delete(key).await {
                result = Err(e);
            }
        }
        result
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut result = Ok(());
        for tier in &self.tiers {
            if let Err(e) = tier.clear().await {
                result = Err(e);
            }
        }
        result
    }

    async fn has(&self, key: &str) -> bool {
        for tier in &self.tiers {
            if tier.has(key).await {
                return true;
            }
        }
        false
    }
}
