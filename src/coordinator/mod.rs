// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data-service optimizer coordinator.
//!
//! The [`DataServiceOptimizer`] ties the pieces together for one data service:
//! - cache lookup with key generalization
//! - single-flight population keyed by [`CacheKey`]
//! - replay of cached or in-flight rows into a new run
//! - predicate push-down for named steps
//!
//! # Flow
//!
//! ```text
//! query ──→ lookup ──hit──→ replay(Cached)
//!             │
//!             miss
//!             ▼
//!       begin_populating ──in flight──→ Attached(tracker) ──→ replay(Live)
//!             │
//!             ▼
//!       Started(tracker) ──resolved──→ store under key ──→ drop in-flight entry
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use dataservice_optimizer::{
//!     DataServiceDefinition, DataServiceOptimizer, InMemoryResultStore, OptimizerConfig,
//!     QueryDescriptor,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let optimizer = DataServiceOptimizer::new(
//!     DataServiceDefinition::new("orders", "output"),
//!     OptimizerConfig::default(),
//!     Arc::new(InMemoryResultStore::from_config(&OptimizerConfig::default())),
//!     tokio::runtime::Handle::current(),
//! );
//!
//! assert_eq!(optimizer.cache_name(), "dataservice_cache_orders");
//! let cached = optimizer.lookup(&QueryDescriptor::new(7)).await.unwrap();
//! assert!(cached.is_none());
//! # }
//! ```

mod types;

pub use types::{LookupOutcome, Population};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CachedResult};
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, Result};
use crate::execution::{Execution, QueryDescriptor};
use crate::filter::FilterNode;
use crate::population::{CacheReplay, PopulationOutcome, PopulationTracker, ReplayHandle, ReplaySource};
use crate::storage::ResultStore;
use crate::strategy::{DataServiceDefinition, ServiceOptimization};

/// Populations currently in flight, by exact cache key.
///
/// Owned explicitly so several optimizers can share one map.
pub type InFlightMap = Arc<DashMap<CacheKey, Arc<PopulationTracker>>>;

/// Per-service optimizer.
///
/// `Send + Sync`; every operation takes `&self`.
pub struct DataServiceOptimizer {
    definition: DataServiceDefinition,
    config: OptimizerConfig,
    store: Arc<dyn ResultStore>,
    in_flight: InFlightMap,
    /// Runs replay tasks and result writes
    executor: Handle,
}

impl DataServiceOptimizer {
    pub fn new(
        definition: DataServiceDefinition,
        config: OptimizerConfig,
        store: Arc<dyn ResultStore>,
        executor: Handle,
    ) -> Self {
        info!(
            service = %definition.name,
            strategies = definition.strategies.len(),
            caching = definition.result_cache().is_some(),
            "Data-service optimizer created"
        );
        Self {
            definition,
            config,
            store,
            in_flight: Arc::new(DashMap::new()),
            executor,
        }
    }

    /// Share an in-flight map with other optimizers
    #[must_use]
    pub fn with_in_flight(mut self, in_flight: InFlightMap) -> Self {
        self.in_flight = in_flight;
        self
    }

    #[must_use]
    pub fn definition(&self) -> &DataServiceDefinition {
        &self.definition
    }

    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Physical cache-store name shared by every key of this service
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}{}", self.config.cache_name_prefix, self.definition.name)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Best stored result for `query`, if one answers it.
    ///
    /// Tries the key's generalizations in order and stops at the first
    /// entry found. An entry that cannot answer the query is a miss; looser
    /// keys are not tried after it.
    pub async fn lookup(&self, query: &QueryDescriptor) -> Result<Option<Arc<CachedResult>>> {
        if self.definition.result_cache().is_none() {
            return Ok(None);
        }
        let key = CacheKey::create(query)?;
        let cache = self.cache_name();

        let found = match self.store.get_first(&cache, &key.lookup_order()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(service = %self.definition.name, key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        };

        let (outcome, result) = match found {
            Some((matched, result)) if result.answers_query(query) => {
                debug!(service = %self.definition.name, key = %key, matched = %matched, rows = result.len(), "Cache hit");
                (LookupOutcome::Hit, Some(result))
            }
            Some((matched, result)) => {
                debug!(
                    service = %self.definition.name,
                    key = %key,
                    matched = %matched,
                    row_rank = ?result.row_rank(),
                    "Cached entry cannot answer query"
                );
                (LookupOutcome::Insufficient, None)
            }
            None => {
                debug!(service = %self.definition.name, key = %key, "Cache miss");
                (LookupOutcome::Miss, None)
            }
        };
        crate::metrics::record_lookup(&self.definition.name, outcome.as_str());
        Ok(result)
    }

    /// Capture `execution`'s output for `query`, or attach to the population
    /// already running for the same key.
    ///
    /// A running population is only joined if its caps can answer `query`.
    /// Otherwise a new population starts on `execution` and takes over the
    /// in-flight slot; the capped one still stores its own result.
    pub fn begin_populating(&self, query: &QueryDescriptor, execution: &Arc<dyn Execution>) -> Result<Population> {
        if self.definition.result_cache().is_none() {
            return Err(OptimizerError::Configuration(format!(
                "service '{}' has no result cache",
                self.definition.name
            )));
        }
        let key = CacheKey::create(query)?;

        let new_tracker = || {
            Arc::new(PopulationTracker::new(
                key.clone(),
                query.clone(),
                self.definition.output_step.clone(),
                &self.config,
            ))
        };

        let (tracker, displaced) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut existing) => {
                let current = Arc::clone(existing.get());
                if current.can_answer(query) {
                    debug!(service = %self.definition.name, key = %key, tracker = %current.id(), "Attaching to in-flight population");
                    crate::metrics::record_attach(&self.definition.name);
                    return Ok(Population::Attached(current));
                }
                // Capped capture too small for this query: run our own and
                // let later joiners attach to the wider one
                debug!(
                    service = %self.definition.name,
                    key = %key,
                    tracker = %current.id(),
                    "In-flight population cannot answer query, starting another"
                );
                let tracker = new_tracker();
                existing.insert(Arc::clone(&tracker));
                (tracker, Some(current))
            }
            Entry::Vacant(slot) => {
                let tracker = new_tracker();
                slot.insert(Arc::clone(&tracker));
                (tracker, None)
            }
        };

        tracker.install(execution);
        if let Some(err) = tracker.install_error() {
            match displaced {
                Some(previous) if !previous.state().is_resolved() => {
                    if let Some(mut slot) = self.in_flight.get_mut(&key) {
                        if Arc::ptr_eq(slot.value(), &tracker) {
                            *slot = previous;
                        }
                    }
                }
                _ => {
                    self.in_flight.remove_if(&key, |_, t| Arc::ptr_eq(t, &tracker));
                }
            }
            crate::metrics::set_in_flight(&self.definition.name, self.in_flight.len());
            return Err(err.clone());
        }
        crate::metrics::set_in_flight(&self.definition.name, self.in_flight.len());

        let sink = ResultSink {
            service: self.definition.name.clone(),
            cache: self.cache_name(),
            key: key.clone(),
            tracker_id: tracker.id().to_string(),
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            executor: self.executor.clone(),
        };
        tracker.on_resolved(move |outcome| sink.resolved(outcome));

        info!(service = %self.definition.name, key = %key, tracker = %tracker.id(), "Population started");
        Ok(Population::Started(tracker))
    }

    /// Replay `source` into `target` on the executor
    pub fn replay(&self, source: ReplaySource, target: Arc<dyn Execution>) -> Result<ReplayHandle> {
        let cache = self.definition.result_cache().ok_or_else(|| {
            OptimizerError::Configuration(format!("service '{}' has no result cache", self.definition.name))
        })?;
        let replay = CacheReplay::new(source, cache.wiring.clone(), &self.config);
        Ok(replay.spawn(target, &self.executor))
    }

    /// Filter to push into `step`, or `None` to skip push-down
    #[must_use]
    pub fn rewrite_for_step(&self, filter: &FilterNode, step: &str) -> Option<FilterNode> {
        for strategy in self.definition.for_step(step) {
            if let Some(pushed) = strategy.push_down(filter) {
                debug!(service = %self.definition.name, step, strategy = strategy.name(), "Filter pushed down");
                crate::metrics::record_pushdown(&self.definition.name, step, true);
                return Some(pushed);
            }
        }
        crate::metrics::record_pushdown(&self.definition.name, step, false);
        None
    }
}

/// Stores a resolved population and clears its in-flight entry
struct ResultSink {
    service: String,
    cache: String,
    key: CacheKey,
    tracker_id: String,
    store: Arc<dyn ResultStore>,
    in_flight: InFlightMap,
    executor: Handle,
}

impl ResultSink {
    fn resolved(self, outcome: &PopulationOutcome) {
        match outcome {
            Ok(result) => {
                let label = if result.is_complete() { "complete" } else { "partial" };
                crate::metrics::record_population(&self.service, label, result.len());
                let result = Arc::clone(result);
                let executor = self.executor.clone();
                // In-flight entry stays until the write lands
                executor.spawn(async move {
                    self.store_result(result).await;
                    self.clear_in_flight();
                });
            }
            Err(e) => {
                crate::metrics::record_population(&self.service, "failed", 0);
                warn!(service = %self.service, key = %self.key, error = %e, "Population not cached");
                self.clear_in_flight();
            }
        }
    }

    async fn store_result(&self, result: Arc<CachedResult>) {
        if result.is_complete() {
            self.store_complete(result).await;
        } else {
            self.store_partial(result).await;
        }
    }

    /// Complete results live under the order-free key. Lookups check the exact
    /// key first, so whatever sits there is evicted.
    async fn store_complete(&self, result: Arc<CachedResult>) {
        let target = self.key.without_order();
        match self.store.put(&self.cache, target.clone(), result).await {
            Ok(()) => debug!(service = %self.service, key = %target, "Population stored"),
            Err(e) => {
                warn!(service = %self.service, key = %target, error = %e, "Failed to store population");
                return;
            }
        }

        if self.key != target {
            if let Err(e) = self.store.evict(&self.cache, &self.key).await {
                warn!(service = %self.service, key = %self.key, error = %e, "Failed to evict shadowing entry");
            }
        }
    }

    /// Partial results go under the exact key, unless a complete entry
    /// anywhere on the lookup path already answers more.
    async fn store_partial(&self, result: Arc<CachedResult>) {
        for candidate in self.key.lookup_order() {
            match self.store.get(&self.cache, &candidate).await {
                Ok(Some(existing)) if !result.supersedes(&existing) => {
                    debug!(service = %self.service, key = %candidate, "Keeping existing entry");
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!(service = %self.service, key = %candidate, error = %e, "Existing entry check failed"),
            }
        }

        match self.store.put(&self.cache, self.key.clone(), result).await {
            Ok(()) => debug!(service = %self.service, key = %self.key, "Partial population stored"),
            Err(e) => warn!(service = %self.service, key = %self.key, error = %e, "Failed to store population"),
        }
    }

    fn clear_in_flight(&self) {
        self.in_flight.remove_if(&self.key, |_, t| t.id() == self.tracker_id);
        crate::metrics::set_in_flight(&self.service, self.in_flight.len());
    }
}
