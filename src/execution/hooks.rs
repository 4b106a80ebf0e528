//! Appendable lifecycle hooks for one run.
//!
//! The engine owns an [`ExecutionHooks`] per run and calls
//! [`fire_ready`](ExecutionHooks::fire_ready) once every step is wired and
//! about to start. Population trackers claim the single population slot
//! before registering their ready callback.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Callback run when the execution becomes ready
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// Lifecycle hook registry for a single run
#[derive(Default)]
pub struct ExecutionHooks {
    population_owner: Mutex<Option<String>>,
    ready: Mutex<Vec<ReadyCallback>>,
    fired: AtomicBool,
}

impl ExecutionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run's population slot.
    ///
    /// Returns the current owner's id if another population already holds it.
    pub fn claim_population(&self, owner: &str) -> Result<(), String> {
        let mut slot = self.population_owner.lock();
        match slot.as_deref() {
            Some(existing) if existing != owner => Err(existing.to_string()),
            _ => {
                *slot = Some(owner.to_string());
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn population_owner(&self) -> Option<String> {
        self.population_owner.lock().clone()
    }

    /// Append a ready callback. Runs immediately if the run is already ready.
    pub fn on_ready(&self, callback: ReadyCallback) {
        {
            let mut ready = self.ready.lock();
            if !self.fired.load(Ordering::Acquire) {
                ready.push(callback);
                return;
            }
        }
        callback();
    }

    /// Called by the engine once. Later calls are ignored.
    pub fn fire_ready(&self) {
        let callbacks = {
            let mut ready = self.ready.lock();
            if self.fired.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *ready)
        };
        debug!(count = callbacks.len(), "Firing ready hooks");
        for callback in callbacks {
            callback();
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
