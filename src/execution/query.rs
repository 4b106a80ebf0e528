//! Compiled query descriptor handed over by the SQL layer.

use std::collections::BTreeMap;

use crate::filter::FilterNode;

/// Everything the optimizer needs to know about one compiled query.
///
/// Built by the SQL layer; the optimizer only reads it. Caps of `Some(0)` mean
/// "no cap", matching how the engine treats a zero row limit.
///
/// # Example
///
/// ```
/// use dataservice_optimizer::execution::QueryDescriptor;
/// use dataservice_optimizer::filter::FilterNode;
///
/// let query = QueryDescriptor::new(7)
///     .with_filter(FilterNode::eq("country", "NZ"))
///     .with_order_by(["name"])
///     .with_limit(10);
/// assert_eq!(query.limit, Some(10));
/// assert!(!query.requests_aggregation());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    /// Fingerprint of the compiled pipeline; `None` if it could not be computed
    pub pipeline_fingerprint: Option<u64>,
    /// Execution row cap requested by the client
    pub row_limit: Option<u64>,
    /// Execution cap on rows read from the pipeline's source
    pub source_row_limit: Option<u64>,
    /// SQL LIMIT
    pub limit: Option<u64>,
    /// SQL OFFSET
    pub offset: Option<u64>,
    /// Aggregate functions in the select list
    pub aggregate: bool,
    /// SELECT DISTINCT
    pub distinct: bool,
    /// GROUP BY present
    pub group_by: bool,
    /// Bound parameters, ordered by name
    pub parameters: BTreeMap<String, String>,
    /// Parsed WHERE clause
    pub filter: Option<FilterNode>,
    /// ORDER BY fields, as written
    pub order_by: Vec<String>,
}

impl QueryDescriptor {
    pub fn new(pipeline_fingerprint: u64) -> Self {
        Self {
            pipeline_fingerprint: Some(pipeline_fingerprint),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.row_limit = Some(row_limit);
        self
    }

    pub fn with_source_row_limit(mut self, source_row_limit: u64) -> Self {
        self.source_row_limit = Some(source_row_limit);
        self
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn with_group_by(mut self) -> Self {
        self.group_by = true;
        self
    }

    pub fn with_aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    /// Aggregation, DISTINCT or GROUP BY requested
    #[must_use]
    pub fn requests_aggregation(&self) -> bool {
        self.aggregate || self.distinct || self.group_by
    }

    /// Effective execution row cap (zero normalized away)
    #[must_use]
    pub fn row_cap(&self) -> Option<u64> {
        self.row_limit.filter(|n| *n > 0)
    }

    /// Effective execution source-row cap (zero normalized away)
    #[must_use]
    pub fn source_row_cap(&self) -> Option<u64> {
        self.source_row_limit.filter(|n| *n > 0)
    }
}
