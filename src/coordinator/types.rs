//! Public types for the optimizer coordinator.

use std::sync::Arc;

use crate::population::PopulationTracker;

/// Outcome of [`super::DataServiceOptimizer::begin_populating()`].
#[derive(Debug, Clone)]
pub enum Population {
    /// A new tracker was installed on the caller's run
    Started(Arc<PopulationTracker>),
    /// The same key was already being populated; await that tracker instead
    Attached(Arc<PopulationTracker>),
}

impl Population {
    #[must_use]
    pub fn tracker(&self) -> &Arc<PopulationTracker> {
        match self {
            Self::Started(tracker) | Self::Attached(tracker) => tracker,
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Attached(_))
    }
}

/// Result of a cache lookup, as recorded in metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Entry found and answers the query
    Hit,
    /// No entry under any of the looked-up keys
    Miss,
    /// First entry found cannot answer the query
    Insufficient,
}

impl LookupOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Insufficient => "insufficient",
        }
    }
}

impl std::fmt::Display for LookupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
