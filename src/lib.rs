//! # Data-Service Optimizer
//!
//! Query-time optimizations for data services: virtual SQL tables backed by a
//! batch pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 DataServiceOptimizer (per service)          │
//! │  • lookup → best cached entry, trying looser keys           │
//! │  • begin_populating → single flight per CacheKey            │
//! │  • replay → inject rows into a fresh run                    │
//! │  • rewrite_for_step → predicate push-down                   │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                      │
//!          ▼                    ▼                      ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   cache          │ │   population     │ │   pushdown       │
//! │  CacheKey        │ │  Tracker         │ │  FilterNode →    │
//! │  CachedResult    │ │  CacheReplay     │ │  mapped subtree  │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!          │                    │
//!          ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────────────────────────┐
//! │  ResultStore     │ │  Execution (engine seam)             │
//! │  get/put/evict   │ │  hooks, step listeners, injectors    │
//! └──────────────────┘ └──────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dataservice_optimizer::{
//!     DataServiceDefinition, DataServiceOptimizer, FilterNode, InMemoryResultStore,
//!     OptimizerConfig, PushDownStrategy, QueryDescriptor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let definition = DataServiceDefinition::new("orders", "output")
//!         .with_strategy(PushDownStrategy::new("to_source", "read_orders").with_mapping("order_id", "id"));
//!
//!     let optimizer = DataServiceOptimizer::new(
//!         definition,
//!         OptimizerConfig::default(),
//!         Arc::new(InMemoryResultStore::from_config(&OptimizerConfig::default())),
//!         tokio::runtime::Handle::current(),
//!     );
//!
//!     let filter = FilterNode::eq("order_id", 42).and(FilterNode::eq("note", "x"));
//!     let pushed = optimizer.rewrite_for_step(&filter, "read_orders");
//!     assert_eq!(pushed, Some(FilterNode::eq("id", 42)));
//!
//!     let query = QueryDescriptor::new(7).with_filter(filter).with_limit(10);
//!     assert!(optimizer.lookup(&query).await.unwrap().is_none());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`DataServiceOptimizer`] composing everything per service
//! - [`cache`]: Cache keys, generalization and answerability
//! - [`population`]: Single-flight capture and replay
//! - [`pushdown`]: Filter rewriting into upstream field names
//! - [`filter`]: Filter trees and canonical WHERE text
//! - [`execution`]: Traits the pipeline engine implements
//! - [`storage`]: Keyed result stores
//! - [`strategy`]: Optimization strategies of a service

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod filter;
pub mod metrics;
pub mod population;
pub mod pushdown;
pub mod storage;
pub mod strategy;

pub use cache::{CacheKey, CachedResult};
pub use config::OptimizerConfig;
pub use coordinator::{DataServiceOptimizer, InFlightMap, LookupOutcome, Population};
pub use error::{OptimizerError, Result};
pub use execution::{
    Execution, ExecutionHooks, QueryDescriptor, Row, RowInjector, RowMeta, StepListener, StepOutcome, StepOutput,
};
pub use filter::{Comparator, Condition, FilterBuilder, FilterNode, Literal, Operator};
pub use population::{
    CacheReplay, PopulationState, PopulationTracker, ReplayHandle, ReplaySource, ReplayWiring, TrackedRows,
};
pub use pushdown::{FieldMapping, FieldMappings};
pub use storage::{InMemoryResultStore, ResultStore, StorageError, StoreStats};
pub use strategy::{
    DataServiceDefinition, OptimizationStrategy, PushDownStrategy, ResultCacheStrategy, ServiceOptimization,
    StrategyKind,
};
