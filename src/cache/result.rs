// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cached results and the ranking model
//!
//! A [`CachedResult`] remembers how much of the full result it holds:
//!
//! - **row rank**: upper bound on output rows the capture allowed
//! - **source row rank**: upper bound on rows read from the source
//!
//! Both absent means the capture is complete and answers any query.
//! The two bounds are compared independently, never combined.
//!
//! # Example
//!
//! ```
//! use dataservice_optimizer::cache::CachedResult;
//! use dataservice_optimizer::execution::QueryDescriptor;
//!
//! let captured = QueryDescriptor::new(1).with_limit(100);
//! let result = CachedResult::partial(vec![], &captured);
//!
//! assert!(result.answers_query(&QueryDescriptor::new(1).with_limit(50)));
//! assert!(!result.answers_query(&QueryDescriptor::new(1).with_limit(150)));
//! ```

use std::sync::Arc;

use crate::execution::{QueryDescriptor, Row};

/// Rank value meaning "no known limit"
pub const UNBOUNDED: u64 = u64::MAX;

/// Output-row rank a query asks for: LIMIT+OFFSET, else row cap, else unbounded
#[must_use]
pub fn rank(query: &QueryDescriptor) -> u64 {
    match query.limit {
        Some(limit) => limit.saturating_add(query.offset.unwrap_or(0)),
        None => query.row_cap().unwrap_or(UNBOUNDED),
    }
}

/// Source-row rank a query asks for: source-row cap, else unbounded
#[must_use]
pub fn source_rank(query: &QueryDescriptor) -> u64 {
    query.source_row_cap().unwrap_or(UNBOUNDED)
}

fn bounded(rank: u64) -> Option<u64> {
    (rank != UNBOUNDED).then_some(rank)
}

/// An immutable captured result set
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    rows: Arc<[Row]>,
    row_rank: Option<u64>,
    source_row_rank: Option<u64>,
}

impl CachedResult {
    pub fn new(rows: Vec<Row>, row_rank: Option<u64>, source_row_rank: Option<u64>) -> Self {
        Self {
            rows: rows.into(),
            row_rank: row_rank.and_then(bounded),
            source_row_rank: source_row_rank.and_then(bounded),
        }
    }

    /// Every row the pipeline produced
    pub fn complete(rows: Vec<Row>) -> Self {
        Self::new(rows, None, None)
    }

    /// Rows from a run that stopped at the query's caps
    pub fn partial(rows: Vec<Row>, query: &QueryDescriptor) -> Self {
        Self::new(rows, bounded(rank(query)), bounded(source_rank(query)))
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Shared handle to the rows
    #[must_use]
    pub fn shared_rows(&self) -> Arc<[Row]> {
        self.rows.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row_rank(&self) -> Option<u64> {
        self.row_rank
    }

    #[must_use]
    pub fn source_row_rank(&self) -> Option<u64> {
        self.source_row_rank
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.row_rank.is_none() && self.source_row_rank.is_none()
    }

    /// Whether this result holds everything `query` needs
    #[must_use]
    pub fn answers_query(&self, query: &QueryDescriptor) -> bool {
        if self.is_complete() {
            return true;
        }
        // Partial input cannot be re-aggregated
        if query.requests_aggregation() {
            return false;
        }

        let rows_ok = self.row_rank.map_or(true, |r| r >= rank(query));
        let source_ok = self.source_row_rank.map_or(true, |r| r >= source_rank(query));
        rows_ok && source_ok
    }

    /// Whether this result may replace `existing` under the same key.
    /// A partial result never displaces a complete one.
    #[must_use]
    pub fn supersedes(&self, existing: &CachedResult) -> bool {
        self.is_complete() || !existing.is_complete()
    }
}
