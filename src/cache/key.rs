// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache keys and generalization
//!
//! A [`CacheKey`] identifies a result set by pipeline version, bound
//! parameters, canonical WHERE text and ORDER BY fields. Lookups try a
//! sequence of increasingly loose keys:
//!
//! ```text
//! exact                 (version, params, where, order)
//!   └─ without_order    (version, params, where, [])
//!        └─ without_condition (version, params, None, [])
//! ```
//!
//! A hit on a looser key is still only structurally compatible; the entry
//! must pass [`CachedResult::answers_query`](super::CachedResult::answers_query)
//! before it is used.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OptimizerError;
use crate::execution::QueryDescriptor;
use crate::filter::canonical_where;

/// Immutable lookup key for a cached result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pipeline_version: u64,
    parameters: BTreeMap<String, String>,
    where_clause: Option<String>,
    order_by: Vec<String>,
}

impl CacheKey {
    pub fn new(
        pipeline_version: u64,
        parameters: BTreeMap<String, String>,
        where_clause: Option<String>,
        order_by: Vec<String>,
    ) -> Self {
        Self {
            pipeline_version,
            parameters,
            where_clause,
            order_by,
        }
    }

    /// Build the exact key for a compiled query.
    ///
    /// Fails with [`OptimizerError::Configuration`] when the pipeline
    /// fingerprint is unavailable.
    pub fn create(query: &QueryDescriptor) -> Result<Self, OptimizerError> {
        let pipeline_version = query.pipeline_fingerprint.ok_or_else(|| {
            OptimizerError::Configuration("pipeline fingerprint unavailable".to_string())
        })?;

        Ok(Self {
            pipeline_version,
            parameters: query.parameters.clone(),
            where_clause: canonical_where(query.filter.as_ref()),
            order_by: query.order_by.clone(),
        })
    }

    #[must_use]
    pub fn pipeline_version(&self) -> u64 {
        self.pipeline_version
    }

    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    #[must_use]
    pub fn order_by(&self) -> &[String] {
        &self.order_by
    }

    /// Copy with the ordering dropped
    #[must_use]
    pub fn without_order(&self) -> Self {
        Self {
            order_by: Vec::new(),
            ..self.clone()
        }
    }

    /// Copy with the predicate dropped
    #[must_use]
    pub fn without_condition(&self) -> Self {
        Self {
            where_clause: None,
            ..self.clone()
        }
    }

    /// The generalization sequence, most specific first.
    ///
    /// Always three entries. When this key has no ordering and/or no
    /// predicate some entries coincide; use [`lookup_order`](Self::lookup_order)
    /// to walk only distinct keys.
    #[must_use]
    pub fn all(&self) -> Vec<CacheKey> {
        let unordered = self.without_order();
        let unconditioned = unordered.without_condition();
        vec![self.clone(), unordered, unconditioned]
    }

    /// Distinct keys of [`all`](Self::all), in lookup order
    #[must_use]
    pub fn lookup_order(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = Vec::with_capacity(3);
        for key in self.all() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.pipeline_version)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", self.order_by.join(", "))?;
        }
        Ok(())
    }
}
