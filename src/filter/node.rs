// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter tree - boolean predicate AST
//!
//! The SQL layer parses a query's WHERE clause into a [`FilterNode`] tree.
//! The same tree feeds the cache key (as canonical text) and the push-down
//! rewriter.
//!
//! # Example
//!
//! ```rust
//! use dataservice_optimizer::filter::{Comparator, FilterBuilder, FilterNode};
//!
//! // Single condition
//! let filter = FilterNode::eq("country", "NZ");
//!
//! // Boolean combinations
//! let filter = FilterNode::eq("status", "active")
//!     .or(FilterNode::eq("status", "pending"))
//!     .and(FilterNode::compare("age", Comparator::Ge, 18));
//!
//! // Builder
//! let filter = FilterBuilder::new()
//!     .eq("name", "Alice")
//!     .compare("age", Comparator::Lt, 40)
//!     .build_and();
//! ```

use serde::{Deserialize, Serialize};

/// How a node combines its children. Leaves carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    None,
    And,
    Or,
}

/// Leaf comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl Comparator {
    /// SQL spelling
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Unary comparators take no literal
    #[must_use]
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// Literal operand of a leaf condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<Literal>),
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Leaf predicate: `field comparator literal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub comparator: Comparator,
    pub value: Literal,
}

/// Boolean predicate tree node.
///
/// A leaf has `operator == Operator::None`, no children and a condition.
/// A composite has `And`/`Or` and children. A `None` node with children is a
/// plain grouping and reads as a conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub operator: Operator,
    pub negated: bool,
    pub children: Vec<FilterNode>,
    pub condition: Option<Condition>,
}

impl FilterNode {
    /// Create a leaf condition
    pub fn leaf(field: impl Into<String>, comparator: Comparator, value: Literal) -> Self {
        Self {
            operator: Operator::None,
            negated: false,
            children: Vec::new(),
            condition: Some(Condition {
                field: field.into(),
                comparator,
                value,
            }),
        }
    }

    /// Create an equality leaf: `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::leaf(field, Comparator::Eq, value.into())
    }

    /// Create a comparison leaf
    pub fn compare(field: impl Into<String>, comparator: Comparator, value: impl Into<Literal>) -> Self {
        Self::leaf(field, comparator, value.into())
    }

    /// Create an `IS NULL` leaf
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::leaf(field, Comparator::IsNull, Literal::Null)
    }

    /// Create an `IN (...)` leaf
    pub fn in_list(field: impl Into<String>, values: Vec<Literal>) -> Self {
        Self::leaf(field, Comparator::In, Literal::List(values))
    }

    /// Create a composite node
    pub fn composite(operator: Operator, children: Vec<FilterNode>) -> Self {
        Self {
            operator,
            negated: false,
            children,
            condition: None,
        }
    }

    /// Conjunction of all children
    pub fn all_of(children: Vec<FilterNode>) -> Self {
        Self::composite(Operator::And, children)
    }

    /// Disjunction of all children
    pub fn any_of(children: Vec<FilterNode>) -> Self {
        Self::composite(Operator::Or, children)
    }

    /// Combine with AND
    pub fn and(self, other: FilterNode) -> Self {
        Self::all_of(vec![self, other])
    }

    /// Combine with OR
    pub fn or(self, other: FilterNode) -> Self {
        Self::any_of(vec![self, other])
    }

    /// Toggle negation
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.condition.is_some()
    }

    /// Field names referenced by every leaf, in tree order (may repeat)
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(condition) = &self.condition {
            out.push(condition.field.as_str());
        }
        for child in &self.children {
            child.collect_fields(out);
        }
    }
}

/// Builder for flat filters
#[derive(Default)]
pub struct FilterBuilder {
    nodes: Vec<FilterNode>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add an equality constraint
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.nodes.push(FilterNode::eq(field, value));
        self
    }

    /// Add a comparison constraint
    pub fn compare(mut self, field: impl Into<String>, comparator: Comparator, value: impl Into<Literal>) -> Self {
        self.nodes.push(FilterNode::compare(field, comparator, value));
        self
    }

    /// Add an arbitrary sub-tree
    pub fn node(mut self, node: FilterNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Build with AND semantics. Empty builders yield no filter at all.
    pub fn build_and(self) -> Option<FilterNode> {
        Self::build(self.nodes, Operator::And)
    }

    /// Build with OR semantics
    pub fn build_or(self) -> Option<FilterNode> {
        Self::build(self.nodes, Operator::Or)
    }

    fn build(mut nodes: Vec<FilterNode>, operator: Operator) -> Option<FilterNode> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(FilterNode::composite(operator, nodes)),
        }
    }
}
