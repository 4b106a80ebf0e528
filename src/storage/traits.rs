use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{CacheKey, CachedResult};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Cache '{0}' not found")]
    UnknownCache(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Opaque keyed store for cached results.
///
/// `cache` is the physical store name derived from the data-service name;
/// every key of one service lives in the same physical store.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, cache: &str, key: &CacheKey) -> Result<Option<Arc<CachedResult>>, StorageError>;
    async fn put(&self, cache: &str, key: CacheKey, result: Arc<CachedResult>) -> Result<(), StorageError>;
    async fn evict(&self, cache: &str, key: &CacheKey) -> Result<(), StorageError>;

    /// Look `keys` up in order and return the first hit.
    /// Default implementation falls back to sequential gets.
    async fn get_first(
        &self,
        cache: &str,
        keys: &[CacheKey],
    ) -> Result<Option<(CacheKey, Arc<CachedResult>)>, StorageError> {
        for key in keys {
            if let Some(result) = self.get(cache, key).await? {
                return Ok(Some((key.clone(), result)));
            }
        }
        Ok(None)
    }
}
