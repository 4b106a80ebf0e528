// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Single-flight population of a cache entry from one run.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──ready hook──→ Collecting ──finished──→ Completed | Partial
//!    │                        │
//!    └──AlreadyTracked──┐     └──error / bad row──→ Failed
//!                       ▼
//!                     Failed
//! ```
//!
//! Rows are appended by the engine's worker thread through a
//! [`StepListener`]. Readers may iterate the buffer while it grows; the
//! outcome is broadcast over a `watch` channel and resolves exactly once.

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CachedResult};
use crate::config::OptimizerConfig;
use crate::error::OptimizerError;
use crate::execution::{Execution, QueryDescriptor, Row, RowMeta, StepListener, StepOutcome};

/// Tracker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationState {
    /// Created, waiting for the run to become ready
    Created,
    /// Listening to the output step
    Collecting,
    /// Every row captured
    Completed,
    /// Run stopped at a cap; rows are a prefix
    Partial,
    /// Run failed, row conversion failed, or the run was already tracked
    Failed,
}

impl PopulationState {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }
}

impl std::fmt::Display for PopulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Collecting => write!(f, "Collecting"),
            Self::Completed => write!(f, "Completed"),
            Self::Partial => write!(f, "Partial"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Discrete events driving the state machine
#[derive(Debug)]
pub enum PopulationEvent {
    RowArrived(Row),
    RunFinished { stopped_early: bool },
    RunErrored(OptimizerError),
}

/// Terminal outcome shared by every waiter
pub type PopulationOutcome = Result<Arc<CachedResult>, OptimizerError>;

type ResolvedCallback = Box<dyn FnOnce(&PopulationOutcome) + Send>;

struct Buffer {
    rows: Vec<Row>,
    closed: bool,
}

/// Captures the rows of one run into a [`CachedResult`].
pub struct PopulationTracker {
    id: String,
    key: CacheKey,
    query: QueryDescriptor,
    output_step: String,
    poll_interval: Duration,
    state: watch::Sender<PopulationState>,
    buffer: Mutex<Buffer>,
    signal: Condvar,
    outcome: OnceLock<PopulationOutcome>,
    install_error: OnceLock<OptimizerError>,
    execution: Mutex<Option<Weak<dyn Execution>>>,
    callbacks: Mutex<Vec<ResolvedCallback>>,
}

impl PopulationTracker {
    pub fn new(key: CacheKey, query: QueryDescriptor, output_step: impl Into<String>, config: &OptimizerConfig) -> Self {
        let (state, _) = watch::channel(PopulationState::Created);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            query,
            output_step: output_step.into(),
            poll_interval: config.poll_interval(),
            state,
            buffer: Mutex::new(Buffer {
                rows: Vec::new(),
                closed: false,
            }),
            signal: Condvar::new(),
            outcome: OnceLock::new(),
            install_error: OnceLock::new(),
            execution: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Query whose caps bound this capture
    #[must_use]
    pub fn query(&self) -> &QueryDescriptor {
        &self.query
    }

    /// Whether this capture, however it ends, holds enough rows for `query`.
    ///
    /// Judged from the capturing query's caps, so a capped population that
    /// happens to finish complete is still reported as insufficient.
    #[must_use]
    pub fn can_answer(&self, query: &QueryDescriptor) -> bool {
        CachedResult::partial(Vec::new(), &self.query).answers_query(query)
    }

    #[must_use]
    pub fn state(&self) -> PopulationState {
        *self.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<PopulationState> {
        self.state.subscribe()
    }

    /// Error recorded by [`install`](Self::install), if the run was already tracked
    #[must_use]
    pub fn install_error(&self) -> Option<&OptimizerError> {
        self.install_error.get()
    }

    /// Rows captured so far
    #[must_use]
    pub fn captured(&self) -> usize {
        self.buffer.lock().rows.len()
    }

    /// Terminal outcome, if resolved
    #[must_use]
    pub fn outcome(&self) -> Option<&PopulationOutcome> {
        self.outcome.get()
    }

    /// Claim the run and register for its ready hook.
    ///
    /// If another tracker already owns population for this run, the
    /// `AlreadyTracked` error is recorded here and the tracker resolves
    /// Failed; nothing is raised to the caller.
    pub fn install(self: &Arc<Self>, execution: &Arc<dyn Execution>) {
        let hooks = execution.hooks();
        if let Err(owner) = hooks.claim_population(&self.id) {
            warn!(tracker = %self.id, owner = %owner, key = %self.key, "Run already tracked, not populating");
            let err = OptimizerError::AlreadyTracked { owner };
            let _ = self.install_error.set(err.clone());
            self.resolve(Err(err));
            return;
        }

        *self.execution.lock() = Some(Arc::downgrade(execution));

        let tracker = Arc::clone(self);
        let weak = Arc::downgrade(execution);
        hooks.on_ready(Box::new(move || {
            if let Some(execution) = weak.upgrade() {
                tracker.run(execution.as_ref());
            }
        }));
        debug!(tracker = %self.id, key = %self.key, "Population installed");
    }

    /// Attach to the output step and start collecting.
    pub fn run(self: &Arc<Self>, execution: &dyn Execution) {
        let Some(output) = execution.output(&self.output_step) else {
            self.resolve(Err(OptimizerError::Configuration(format!(
                "output step '{}' not found",
                self.output_step
            ))));
            return;
        };

        {
            let _buffer = self.buffer.lock();
            if self.state() != PopulationState::Created {
                return;
            }
            self.state.send_replace(PopulationState::Collecting);
            self.signal.notify_all();
        }

        output.add_listener(Arc::new(TrackerListener {
            tracker: Arc::clone(self),
            meta: output.row_meta(),
        }));
        info!(tracker = %self.id, step = %self.output_step, key = %self.key, "Population collecting");
    }

    /// Apply one event
    pub fn handle(&self, event: PopulationEvent) {
        match event {
            PopulationEvent::RowArrived(row) => {
                let mut buffer = self.buffer.lock();
                if buffer.closed || self.state() != PopulationState::Collecting {
                    return;
                }
                buffer.rows.push(row);
                self.signal.notify_all();
            }
            PopulationEvent::RunFinished { stopped_early } => {
                if self.outcome.get().is_some() {
                    debug!(tracker = %self.id, "Finish after resolution ignored");
                    return;
                }
                let rows = self.buffer.lock().rows.clone();
                let result = if stopped_early {
                    CachedResult::partial(rows, &self.query)
                } else {
                    CachedResult::complete(rows)
                };
                self.resolve(Ok(Arc::new(result)));
            }
            PopulationEvent::RunErrored(err) => {
                if self.outcome.get().is_some() {
                    debug!(tracker = %self.id, error = %err, "Error after resolution ignored");
                    return;
                }
                self.resolve(Err(err));
            }
        }
    }

    fn resolve(&self, outcome: PopulationOutcome) -> bool {
        let state = match &outcome {
            Ok(result) if result.is_complete() => PopulationState::Completed,
            Ok(_) => PopulationState::Partial,
            Err(_) => PopulationState::Failed,
        };

        {
            let mut buffer = self.buffer.lock();
            if self.outcome.set(outcome).is_err() {
                error!(tracker = %self.id, "Population resolved twice");
                return false;
            }
            buffer.closed = true;
            self.state.send_replace(state);
            self.signal.notify_all();
        }

        match self.outcome.get() {
            Some(Ok(result)) => {
                info!(tracker = %self.id, key = %self.key, state = %state, rows = result.len(), "Population resolved")
            }
            Some(Err(e)) => warn!(tracker = %self.id, key = %self.key, error = %e, "Population failed"),
            None => {}
        }

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        if let Some(outcome) = self.outcome.get() {
            for callback in callbacks {
                callback(outcome);
            }
        }
        true
    }

    /// Run `callback` once the tracker resolves (immediately if it already has)
    pub fn on_resolved(&self, callback: impl FnOnce(&PopulationOutcome) + Send + 'static) {
        let mut callbacks = self.callbacks.lock();
        match self.outcome.get() {
            Some(outcome) => {
                drop(callbacks);
                callback(outcome);
            }
            None => callbacks.push(Box::new(callback)),
        }
    }

    /// Wait for the terminal outcome
    pub async fn result(&self) -> PopulationOutcome {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(PopulationState::is_resolved).await;
        self.outcome
            .get()
            .cloned()
            .unwrap_or_else(|| Err(OptimizerError::PopulationFailed("population abandoned".to_string())))
    }

    /// Block until collection starts or resolves. Returns `false` on timeout.
    pub fn wait_started(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut buffer = self.buffer.lock();
        loop {
            if self.state() != PopulationState::Created {
                return true;
            }
            if self.signal.wait_until(&mut buffer, deadline).timed_out() {
                return self.state() != PopulationState::Created;
            }
        }
    }

    /// Blocking iterator over the rows captured so far and still to come.
    ///
    /// Each call starts from the first row.
    pub fn rows(self: &Arc<Self>) -> TrackedRows {
        TrackedRows {
            tracker: Arc::clone(self),
            next: 0,
        }
    }

    fn is_live(&self) -> bool {
        if self.state().is_resolved() {
            return false;
        }
        self.execution
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|execution| execution.is_running())
    }
}

impl std::fmt::Debug for PopulationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopulationTracker")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("captured", &self.captured())
            .finish()
    }
}

/// Step listener feeding a tracker
struct TrackerListener {
    tracker: Arc<PopulationTracker>,
    meta: RowMeta,
}

impl StepListener for TrackerListener {
    fn row_written(&self, values: &[serde_json::Value]) {
        match Row::capture(&self.meta, values) {
            Ok(row) => self.tracker.handle(PopulationEvent::RowArrived(row)),
            Err(err) => self.tracker.handle(PopulationEvent::RunErrored(err)),
        }
    }

    fn finished(&self, outcome: StepOutcome) {
        let event = if outcome.errors.is_empty() {
            PopulationEvent::RunFinished {
                stopped_early: outcome.stopped_early,
            }
        } else {
            PopulationEvent::RunErrored(OptimizerError::PopulationFailed(outcome.errors.join("; ")))
        };
        self.tracker.handle(event);
    }
}

/// Restartable, blocking iterator over a tracker's buffer.
///
/// `has_more` waits up to one poll interval at a time while the run is
/// live, so readers never spin and never hang past completion.
pub struct TrackedRows {
    tracker: Arc<PopulationTracker>,
    next: usize,
}

impl TrackedRows {
    pub fn has_more(&mut self) -> bool {
        let tracker = &self.tracker;
        let mut buffer = tracker.buffer.lock();
        loop {
            if self.next < buffer.rows.len() {
                return true;
            }
            if buffer.closed || !tracker.is_live() {
                return false;
            }
            tracker.signal.wait_for(&mut buffer, tracker.poll_interval);
        }
    }

    /// Position of the next row
    #[must_use]
    pub fn position(&self) -> usize {
        self.next
    }
}

impl Iterator for TrackedRows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if !self.has_more() {
            return None;
        }
        let row = self.tracker.buffer.lock().rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        row
    }
}
