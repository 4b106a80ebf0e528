// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Predicate Push-Down
//!
//! Translates a query's [`FilterNode`] tree into the field vocabulary of an
//! upstream pipeline step so the filter can run earlier, inside the pipeline.
//! The full filter still runs downstream, so the pushed filter may be looser
//! than the original but must never exclude a row the original keeps.
//!
//! # Rules
//!
//! ```text
//! leaf   mapped field      → renamed copy
//!        unmapped field    → unmappable
//! AND    drop unmappable children, keep the rest in order
//!        0 left            → unmappable
//!        1 left            → promote it, parent negation XOR'd in
//! OR     any child unmappable → whole node unmappable
//! ```
//!
//! An unmappable result at the top means push-down is skipped entirely.
//!
//! Dropping a conjunct under a negated AND narrows that subtree. Callers that
//! need strict widening should keep negated conjunctions out of pushed filters.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::filter::{FilterNode, Operator};

/// A single source→target field rename
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct FieldMapping {
    /// Field name as the query sees it
    pub source: String,
    /// Field name inside the upstream step
    pub target: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Lookup table of field renames, keyed by source name
#[derive(Debug, Clone, Default)]
pub struct FieldMappings {
    by_source: HashMap<String, String>,
}

impl FieldMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping; a later mapping for the same source wins
    pub fn with(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.by_source.insert(source.into(), target.into());
        self
    }

    #[must_use]
    pub fn target(&self, source: &str) -> Option<&str> {
        self.by_source.get(source).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

impl FromIterator<FieldMapping> for FieldMappings {
    fn from_iter<I: IntoIterator<Item = FieldMapping>>(iter: I) -> Self {
        Self {
            by_source: iter.into_iter().map(|m| (m.source, m.target)).collect(),
        }
    }
}

impl<'a> FromIterator<&'a FieldMapping> for FieldMappings {
    fn from_iter<I: IntoIterator<Item = &'a FieldMapping>>(iter: I) -> Self {
        iter.into_iter().cloned().collect()
    }
}

/// Rewrite `filter` into the target vocabulary.
///
/// Returns `None` when nothing safe can be pushed down.
pub fn rewrite(filter: &FilterNode, mappings: &FieldMappings) -> Option<FilterNode> {
    let rewritten = rewrite_node(filter, mappings);
    if rewritten.is_none() {
        debug!(fields = ?filter.fields(), "Filter is unmappable, skipping push-down");
    }
    rewritten
}

fn rewrite_node(node: &FilterNode, mappings: &FieldMappings) -> Option<FilterNode> {
    if let Some(condition) = &node.condition {
        let target = mappings.target(&condition.field)?;
        let mut renamed = node.clone();
        if let Some(c) = renamed.condition.as_mut() {
            c.field = target.to_string();
        }
        return Some(renamed);
    }

    match node.operator {
        Operator::Or => rewrite_disjunction(node, mappings),
        Operator::And | Operator::None => rewrite_conjunction(node, mappings),
    }
}

/// Conjunction: unmappable children are dropped.
fn rewrite_conjunction(node: &FilterNode, mappings: &FieldMappings) -> Option<FilterNode> {
    let survivors: Vec<FilterNode> = node
        .children
        .iter()
        .filter_map(|child| rewrite_node(child, mappings))
        .collect();

    collapse(node, Operator::And, survivors)
}

/// Disjunction: all or nothing.
fn rewrite_disjunction(node: &FilterNode, mappings: &FieldMappings) -> Option<FilterNode> {
    let children = node
        .children
        .iter()
        .map(|child| rewrite_node(child, mappings))
        .collect::<Option<Vec<FilterNode>>>()?;

    collapse(node, Operator::Or, children)
}

fn collapse(parent: &FilterNode, operator: Operator, mut children: Vec<FilterNode>) -> Option<FilterNode> {
    match children.len() {
        0 => None,
        1 => {
            let mut promoted = children.remove(0);
            if promoted.is_leaf() {
                promoted.operator = Operator::None;
            }
            promoted.negated ^= parent.negated;
            Some(promoted)
        }
        _ => Some(FilterNode {
            operator,
            negated: parent.negated,
            children,
            condition: None,
        }),
    }
}
