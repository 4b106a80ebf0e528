// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optimization strategies attached to a data service.
//!
//! Strategies form a closed set. A service definition carries a list of
//! them, tagged by `type`:
//!
//! ```
//! use dataservice_optimizer::{DataServiceDefinition, ServiceOptimization, StrategyKind};
//!
//! let definition: DataServiceDefinition = serde_json::from_value(serde_json::json!({
//!     "name": "orders",
//!     "output_step": "output",
//!     "strategies": [
//!         {
//!             "type": "predicate_push_down",
//!             "name": "to_source",
//!             "target_step": "read_orders",
//!             "mappings": [{ "source": "order_id", "target": "id" }]
//!         },
//!         {
//!             "type": "result_cache",
//!             "name": "cache",
//!             "wiring": {
//!                 "producer_step": "read_orders",
//!                 "bypassed_output": "read_orders",
//!                 "injection_step": "cached_rows"
//!             }
//!         }
//!     ]
//! }))
//! .unwrap();
//!
//! assert_eq!(definition.strategies[0].kind(), StrategyKind::PredicatePushDown);
//! assert!(definition.result_cache().is_some());
//! ```

use serde::Deserialize;

use crate::filter::FilterNode;
use crate::population::ReplayWiring;
use crate::pushdown::{self, FieldMapping, FieldMappings};

/// Which kind of optimization a strategy performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    PredicatePushDown,
    ResultCache,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PredicatePushDown => write!(f, "PredicatePushDown"),
            Self::ResultCache => write!(f, "ResultCache"),
        }
    }
}

/// Capabilities shared by every strategy
pub trait ServiceOptimization {
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    /// Whether this strategy acts on the named step
    fn applies_to_step(&self, _step: &str) -> bool {
        false
    }

    /// Rewrite `filter` for the step this strategy targets.
    /// `None` means nothing can be pushed.
    fn push_down(&self, _filter: &FilterNode) -> Option<FilterNode> {
        None
    }
}

/// Pushes the mappable part of a query filter into an upstream step
#[derive(Debug, Clone, Deserialize)]
pub struct PushDownStrategy {
    pub name: String,
    pub target_step: String,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
}

impl PushDownStrategy {
    pub fn new(name: impl Into<String>, target_step: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_step: target_step.into(),
            mappings: Vec::new(),
        }
    }

    pub fn with_mapping(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.mappings.push(FieldMapping::new(source, target));
        self
    }

    #[must_use]
    pub fn field_mappings(&self) -> FieldMappings {
        self.mappings.iter().collect()
    }
}

impl ServiceOptimization for PushDownStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::PredicatePushDown
    }

    fn applies_to_step(&self, step: &str) -> bool {
        self.target_step == step
    }

    fn push_down(&self, filter: &FilterNode) -> Option<FilterNode> {
        pushdown::rewrite(filter, &self.field_mappings())
    }
}

/// Caches the service output and replays it into later runs
#[derive(Debug, Clone, Deserialize)]
pub struct ResultCacheStrategy {
    pub name: String,
    pub wiring: ReplayWiring,
}

impl ResultCacheStrategy {
    pub fn new(name: impl Into<String>, wiring: ReplayWiring) -> Self {
        Self {
            name: name.into(),
            wiring,
        }
    }
}

impl ServiceOptimization for ResultCacheStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::ResultCache
    }

    fn applies_to_step(&self, step: &str) -> bool {
        self.wiring.producer_step == step || self.wiring.injection_step == step
    }
}

/// Every known strategy
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizationStrategy {
    PredicatePushDown(PushDownStrategy),
    ResultCache(ResultCacheStrategy),
}

impl OptimizationStrategy {
    fn inner(&self) -> &dyn ServiceOptimization {
        match self {
            Self::PredicatePushDown(s) => s,
            Self::ResultCache(s) => s,
        }
    }
}

impl ServiceOptimization for OptimizationStrategy {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    fn applies_to_step(&self, step: &str) -> bool {
        self.inner().applies_to_step(step)
    }

    fn push_down(&self, filter: &FilterNode) -> Option<FilterNode> {
        self.inner().push_down(filter)
    }
}

impl From<PushDownStrategy> for OptimizationStrategy {
    fn from(strategy: PushDownStrategy) -> Self {
        Self::PredicatePushDown(strategy)
    }
}

impl From<ResultCacheStrategy> for OptimizationStrategy {
    fn from(strategy: ResultCacheStrategy) -> Self {
        Self::ResultCache(strategy)
    }
}

/// A virtual table backed by a pipeline, with its optimizations
#[derive(Debug, Clone, Deserialize)]
pub struct DataServiceDefinition {
    pub name: String,
    /// Step whose rows are the service output
    pub output_step: String,
    #[serde(default)]
    pub strategies: Vec<OptimizationStrategy>,
}

impl DataServiceDefinition {
    pub fn new(name: impl Into<String>, output_step: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_step: output_step.into(),
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<OptimizationStrategy>) -> Self {
        self.strategies.push(strategy.into());
        self
    }

    /// The result-cache strategy, if caching is enabled for this service
    #[must_use]
    pub fn result_cache(&self) -> Option<&ResultCacheStrategy> {
        self.strategies.iter().find_map(|s| match s {
            OptimizationStrategy::ResultCache(cache) => Some(cache),
            OptimizationStrategy::PredicatePushDown(_) => None,
        })
    }

    /// Strategies acting on `step`, in declaration order
    pub fn for_step<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a OptimizationStrategy> + 'a {
        self.strategies.iter().filter(move |s| s.applies_to_step(step))
    }
}
