//! Re-inject captured rows into a fresh run.
//!
//! Replay bypasses the branch that would normally produce the rows: the
//! producer is removed from startup, the bypassed output loses its default
//! drain, and rows are pushed in at the injection step instead.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::tracker::PopulationTracker;
use crate::cache::CachedResult;
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, Result};
use crate::execution::{Execution, Row, RowInjector};

/// Step names used to splice cached rows into a run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplayWiring {
    /// Step that normally produces the rows; not started on replay
    pub producer_step: String,
    /// Output whose default consumer is detached
    pub bypassed_output: String,
    /// Where replayed rows enter the run
    pub injection_step: String,
}

/// Rows to replay
#[derive(Debug, Clone)]
pub enum ReplaySource {
    /// A stored result; starts immediately
    Cached(Arc<CachedResult>),
    /// A population still in flight
    Live(Arc<PopulationTracker>),
}

impl ReplaySource {
    fn total(&self) -> Option<usize> {
        match self {
            Self::Cached(result) => Some(result.len()),
            Self::Live(_) => None,
        }
    }
}

/// One replay of a source into a target run
pub struct CacheReplay {
    source: ReplaySource,
    wiring: ReplayWiring,
    put_timeout: Duration,
    startup_timeout: Duration,
}

impl CacheReplay {
    pub fn new(source: ReplaySource, wiring: ReplayWiring, config: &OptimizerConfig) -> Self {
        Self {
            source,
            wiring,
            put_timeout: config.replay_put_timeout(),
            startup_timeout: config.replay_startup_timeout(),
        }
    }

    /// Replay on the calling thread. Returns the number of rows delivered.
    ///
    /// A target that stops running ends the replay without error; the rows
    /// not yet delivered are dropped. A live source that fails is returned as
    /// its error, after the injector has been finished.
    pub fn replay(&self, target: &dyn Execution) -> Result<usize> {
        if let ReplaySource::Live(tracker) = &self.source {
            if !tracker.wait_started(self.startup_timeout) {
                return Err(OptimizerError::Timeout {
                    what: format!("population {} to start", tracker.id()),
                    waited_ms: u64::try_from(self.startup_timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        let injector = target.injector(&self.wiring.injection_step).ok_or_else(|| {
            OptimizerError::Configuration(format!(
                "injection step '{}' not found",
                self.wiring.injection_step
            ))
        })?;

        target.remove_startup(&self.wiring.producer_step);
        target.remove_default_drain(&self.wiring.bypassed_output);
        debug!(
            producer = %self.wiring.producer_step,
            injection = %self.wiring.injection_step,
            "Replay wiring applied"
        );

        let mut delivered = 0usize;
        let mut stopped = false;
        let mut source_error = None;
        match &self.source {
            ReplaySource::Cached(result) => {
                for row in result.rows() {
                    if !self.push(target, injector.as_ref(), row) {
                        stopped = true;
                        break;
                    }
                    delivered += 1;
                }
            }
            ReplaySource::Live(tracker) => {
                for row in tracker.rows() {
                    if !self.push(target, injector.as_ref(), &row) {
                        stopped = true;
                        break;
                    }
                    delivered += 1;
                }
                if let (false, Some(Err(e))) = (stopped, tracker.outcome()) {
                    warn!(tracker = %tracker.id(), error = %e, delivered, "Replay source failed");
                    source_error = Some(e.clone());
                }
            }
        }

        injector.finish();

        let dropped = self.source.total().map_or(0, |total| total.saturating_sub(delivered));
        crate::metrics::record_replay(delivered, dropped);
        if let Some(e) = source_error {
            return Err(e);
        }
        if stopped {
            info!(delivered, dropped, "Replay target stopped early");
        } else {
            info!(delivered, "Replay complete");
        }
        Ok(delivered)
    }

    /// Offer one row until accepted or the target stops running
    fn push(&self, target: &dyn Execution, injector: &dyn RowInjector, row: &Row) -> bool {
        while target.is_running() {
            if injector.put_row(row, self.put_timeout) {
                return true;
            }
        }
        false
    }

    /// Run the replay as a blocking task on `executor`
    pub fn spawn(self, target: Arc<dyn Execution>, executor: &Handle) -> ReplayHandle {
        ReplayHandle {
            inner: executor.spawn_blocking(move || self.replay(target.as_ref())),
        }
    }
}

/// Resolves to the delivered-row count of a spawned replay
#[derive(Debug)]
pub struct ReplayHandle {
    inner: JoinHandle<Result<usize>>,
}

impl ReplayHandle {
    pub async fn delivered(self) -> Result<usize> {
        match self.inner.await {
            Ok(result) => result,
            Err(e) => Err(OptimizerError::PopulationFailed(format!("replay task failed: {e}"))),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}
