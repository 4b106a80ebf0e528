// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pipeline execution seams
//!
//! The optimizer never runs pipelines itself. The engine hands it a compiled
//! [`QueryDescriptor`] and a running [`Execution`]; the optimizer attaches
//! listeners to named steps and, for replay, injects rows at a named step.
//!
//! Listener callbacks are invoked on the engine's own worker threads.

mod hooks;
mod query;
mod row;

pub use hooks::{ExecutionHooks, ReadyCallback};
pub use query::QueryDescriptor;
pub use row::{Row, RowMeta};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// How a step finished, as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Run-level errors recorded by the engine
    pub errors: Vec<String>,
    /// Output was cut short (row cap reached or run cancelled)
    pub stopped_early: bool,
}

impl StepOutcome {
    /// Ran to the end without errors
    #[must_use]
    pub fn finished() -> Self {
        Self::default()
    }

    /// Cut short by a cap or cancellation
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            errors: Vec::new(),
            stopped_early: true,
        }
    }

    /// Run failed
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            stopped_early: false,
        }
    }
}

/// Receives rows and completion from one step
pub trait StepListener: Send + Sync {
    /// A row left the step. Values are borrowed from the engine's buffer.
    fn row_written(&self, values: &[Value]);

    /// The step produced its last row
    fn finished(&self, outcome: StepOutcome);
}

/// A named step output that listeners can attach to
pub trait StepOutput: Send + Sync {
    /// Layout of rows leaving this step
    fn row_meta(&self) -> RowMeta;

    fn add_listener(&self, listener: Arc<dyn StepListener>);
}

/// Entry point for rows fed into a run from outside
pub trait RowInjector: Send + Sync {
    /// Offer a row, waiting at most `timeout`. Returns `false` if not accepted.
    fn put_row(&self, row: &Row, timeout: Duration) -> bool;

    /// No more rows will follow
    fn finish(&self);
}

/// One running instance of a pipeline
pub trait Execution: Send + Sync {
    /// Whether the run is still active
    fn is_running(&self) -> bool;

    /// Appendable lifecycle hooks
    fn hooks(&self) -> &ExecutionHooks;

    /// Resolve a step by name for listener attachment
    fn output(&self, step: &str) -> Option<Arc<dyn StepOutput>>;

    /// Stop the engine from starting `step` as part of normal startup
    fn remove_startup(&self, step: &str);

    /// Detach the default consumer draining `step`
    fn remove_default_drain(&self, step: &str);

    /// Resolve an injection point by step name
    fn injector(&self, step: &str) -> Option<Arc<dyn RowInjector>>;
}
