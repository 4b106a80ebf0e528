// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the optimizer.
//!
//! Every failure is scoped to a single cache key or a single run. Nothing here
//! is retried automatically; callers decide whether to fall back to an
//! uncached execution.

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Errors raised by cache-key creation, population and replay.
///
/// `Clone` so a resolved population outcome can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    /// Key or wiring cannot be computed (e.g. pipeline fingerprint unavailable).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Another tracker already owns population for this run.
    #[error("run is already tracked by population {owner}")]
    AlreadyTracked { owner: String },

    /// A captured row could not be converted into a cached row.
    #[error("row conversion failed on step '{step}': {reason}")]
    RowConversion { step: String, reason: String },

    /// Population did not start before the replay startup deadline.
    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// The pipeline run reported errors.
    #[error("population failed: {0}")]
    PopulationFailed(String),

    /// The keyed cache store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OptimizerError {
    /// Fatal errors end the query; the rest only disable caching for it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Timeout { .. })
    }
}

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;
