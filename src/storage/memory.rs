//! In-memory result store
//!
//! One bounded map per physical cache name. When a cache reaches its entry
//! bound the oldest inserted key is evicted first.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::traits::{ResultStore, StorageError};
use crate::cache::{CacheKey, CachedResult};
use crate::config::OptimizerConfig;

/// Entries of one physical cache
struct NamedCache {
    entries: DashMap<CacheKey, Arc<CachedResult>>,
    /// Insertion order for eviction (oldest first)
    order: Mutex<VecDeque<CacheKey>>,
}

impl NamedCache {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries across all caches
    pub entry_count: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

pub struct InMemoryResultStore {
    caches: DashMap<String, Arc<NamedCache>>,
    max_entries_per_cache: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryResultStore {
    #[must_use]
    pub fn new(max_entries_per_cache: usize) -> Self {
        Self {
            caches: DashMap::new(),
            max_entries_per_cache: max_entries_per_cache.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Store bounded by `config.max_entries_per_cache`
    #[must_use]
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.max_entries_per_cache)
    }

    /// Entry count of one cache
    #[must_use]
    pub fn len(&self, cache: &str) -> usize {
        self.caches.get(cache).map_or(0, |c| c.entries.len())
    }

    #[must_use]
    pub fn is_empty(&self, cache: &str) -> bool {
        self.len(cache) == 0
    }

    /// Drop every entry of one cache
    pub fn clear(&self, cache: &str) {
        self.caches.remove(cache);
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        StoreStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.caches.iter().map(|c| c.entries.len()).sum(),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn named(&self, cache: &str) -> Arc<NamedCache> {
        self.caches
            .entry(cache.to_string())
            .or_insert_with(|| Arc::new(NamedCache::new()))
            .clone()
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn get(&self, cache: &str, key: &CacheKey) -> Result<Option<Arc<CachedResult>>, StorageError> {
        let found = self
            .caches
            .get(cache)
            .and_then(|c| c.entries.get(key).map(|r| r.value().clone()));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn put(&self, cache: &str, key: CacheKey, result: Arc<CachedResult>) -> Result<(), StorageError> {
        let named = self.named(cache);
        let mut order = named.order.lock();

        if !named.entries.contains_key(&key) {
            while named.entries.len() >= self.max_entries_per_cache {
                match order.pop_front() {
                    Some(oldest) => {
                        named.entries.remove(&oldest);
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                    None => break,
                }
            }
            order.push_back(key.clone());
        }

        named.entries.insert(key, result);
        Ok(())
    }

    async fn evict(&self, cache: &str, key: &CacheKey) -> Result<(), StorageError> {
        if let Some(named) = self.caches.get(cache).map(|c| c.value().clone()) {
            let mut order = named.order.lock();
            if named.entries.remove(key).is_some() {
                order.retain(|k| k != key);
            }
        }
        Ok(())
    }
}
