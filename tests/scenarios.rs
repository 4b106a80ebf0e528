//! End-to-end scenarios for the data-service optimizer.
//!
//! A small in-test engine stands in for the pipeline runtime: named output
//! steps that fan rows out to listeners, an injection step that records
//! replayed rows, and a running flag the tests flip.
//!
//! Run with: `cargo test --test scenarios`
//!
//! # Test Organization
//! - `cache_*` - lookup, generalization and answerability
//! - `populate_*` - single-flight capture and storage
//! - `replay_*` - feeding rows into a fresh run
//! - `pushdown_*` - filter rewriting per step

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dataservice_optimizer::{
    CacheKey, CachedResult, DataServiceDefinition, DataServiceOptimizer, Execution, ExecutionHooks, FilterNode,
    InFlightMap, InMemoryResultStore, OptimizerConfig, OptimizerError, Population, PopulationState,
    PushDownStrategy, QueryDescriptor, ResultCacheStrategy, ResultStore, ReplaySource, ReplayWiring, Row,
    RowInjector, RowMeta, StepListener, StepOutcome, StepOutput,
};

// =============================================================================
// Fake engine
// =============================================================================

struct FakeStep {
    meta: RowMeta,
    listeners: Mutex<Vec<Arc<dyn StepListener>>>,
}

impl StepOutput for FakeStep {
    fn row_meta(&self) -> RowMeta {
        self.meta.clone()
    }

    fn add_listener(&self, listener: Arc<dyn StepListener>) {
        self.listeners.lock().push(listener);
    }
}

struct FakeInjector {
    rows: Mutex<Vec<Row>>,
    finished: AtomicUsize,
    running: Arc<AtomicBool>,
    stop_after: Option<usize>,
}

impl RowInjector for FakeInjector {
    fn put_row(&self, row: &Row, _timeout: Duration) -> bool {
        let mut rows = self.rows.lock();
        rows.push(row.clone());
        if self.stop_after.is_some_and(|n| rows.len() >= n) {
            self.running.store(false, Ordering::SeqCst);
        }
        true
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeRun {
    hooks: ExecutionHooks,
    running: Arc<AtomicBool>,
    steps: HashMap<String, Arc<FakeStep>>,
    injector: Arc<FakeInjector>,
    rewired: Mutex<Vec<String>>,
}

impl FakeRun {
    fn new() -> Arc<Self> {
        Self::stopping_after(None)
    }

    fn stopping_after(stop_after: Option<usize>) -> Arc<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let output = Arc::new(FakeStep {
            meta: RowMeta::new("output", vec!["id".into(), "name".into()]),
            listeners: Mutex::new(Vec::new()),
        });
        Arc::new(Self {
            hooks: ExecutionHooks::new(),
            running: running.clone(),
            steps: HashMap::from([("output".to_string(), output)]),
            injector: Arc::new(FakeInjector {
                rows: Mutex::new(Vec::new()),
                finished: AtomicUsize::new(0),
                running,
                stop_after,
            }),
            rewired: Mutex::new(Vec::new()),
        })
    }

    fn as_execution(self: &Arc<Self>) -> Arc<dyn Execution> {
        self.clone()
    }

    fn start(&self) {
        self.hooks.fire_ready();
    }

    fn emit(&self, values: Vec<Value>) {
        for listener in self.steps["output"].listeners.lock().iter() {
            listener.row_written(&values);
        }
    }

    fn finish(&self, outcome: StepOutcome) {
        for listener in self.steps["output"].listeners.lock().iter() {
            listener.finished(outcome.clone());
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn injected(&self) -> Vec<Value> {
        self.injector.rows.lock().iter().map(|r| r.values[0].clone()).collect()
    }
}

impl Execution for FakeRun {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn hooks(&self) -> &ExecutionHooks {
        &self.hooks
    }

    fn output(&self, step: &str) -> Option<Arc<dyn StepOutput>> {
        self.steps.get(step).map(|s| s.clone() as Arc<dyn StepOutput>)
    }

    fn remove_startup(&self, step: &str) {
        self.rewired.lock().push(format!("startup:{step}"));
    }

    fn remove_default_drain(&self, step: &str) {
        self.rewired.lock().push(format!("drain:{step}"));
    }

    fn injector(&self, step: &str) -> Option<Arc<dyn RowInjector>> {
        (step == "cached_rows").then(|| self.injector.clone() as Arc<dyn RowInjector>)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn config() -> OptimizerConfig {
    OptimizerConfig {
        poll_interval_ms: 5,
        replay_put_timeout_ms: 5,
        replay_startup_timeout_ms: 500,
        ..Default::default()
    }
}

fn definition() -> DataServiceDefinition {
    DataServiceDefinition::new("orders", "output")
        .with_strategy(
            PushDownStrategy::new("to_source", "read_orders")
                .with_mapping("order_id", "id")
                .with_mapping("customer", "cust"),
        )
        .with_strategy(ResultCacheStrategy::new(
            "cache",
            ReplayWiring {
                producer_step: "read_orders".into(),
                bypassed_output: "read_orders".into(),
                injection_step: "cached_rows".into(),
            },
        ))
}

fn optimizer_with(store: Arc<InMemoryResultStore>) -> DataServiceOptimizer {
    DataServiceOptimizer::new(definition(), config(), store, tokio::runtime::Handle::current())
}

fn optimizer() -> (DataServiceOptimizer, Arc<InMemoryResultStore>) {
    let store = Arc::new(InMemoryResultStore::from_config(&config()));
    (optimizer_with(store.clone()), store)
}

fn query() -> QueryDescriptor {
    QueryDescriptor::new(7).with_filter(FilterNode::eq("customer", "acme"))
}

fn row(id: i64) -> Vec<Value> {
    vec![json!(id), json!(format!("order-{id}"))]
}

/// Wait until resolved populations have been written and cleared
async fn settle(optimizer: &DataServiceOptimizer) {
    for _ in 0..200 {
        if optimizer.in_flight_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("populations never settled");
}

/// Run one population of `rows` to completion
async fn populate(optimizer: &DataServiceOptimizer, query: &QueryDescriptor, rows: i64, outcome: StepOutcome) {
    let run = FakeRun::new();
    let population = optimizer.begin_populating(query, &run.as_execution()).unwrap();
    assert!(!population.is_attached());
    run.start();
    for id in 1..=rows {
        run.emit(row(id));
    }
    run.finish(outcome);
    settle(optimizer).await;
}

// =============================================================================
// Cache lookup
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn cache_complete_result_answers_other_orderings_and_limits() {
    let (optimizer, store) = optimizer();
    populate(&optimizer, &query(), 10, StepOutcome::finished()).await;

    // Complete results live under the order-free key
    let key = CacheKey::create(&query()).unwrap();
    assert!(store.get(&optimizer.cache_name(), &key.without_order()).await.unwrap().is_some());

    let ordered = query().with_order_by(["order_id"]).with_limit(3);
    let hit = optimizer.lookup(&ordered).await.unwrap().expect("generalized hit");
    assert_eq!(hit.len(), 10);
    assert!(hit.is_complete());

    assert!(optimizer.lookup(&query()).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_filtered_entry_never_answers_unfiltered_query() {
    let (optimizer, _) = optimizer();
    populate(&optimizer, &query(), 3, StepOutcome::finished()).await;

    let unfiltered = QueryDescriptor::new(7);
    assert!(optimizer.lookup(&unfiltered).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_partial_answers_only_within_rank() {
    let (optimizer, _) = optimizer();
    let capped = query().with_limit(100);
    populate(&optimizer, &capped, 100, StepOutcome::stopped()).await;

    let smaller = query().with_limit(50);
    let hit = optimizer.lookup(&smaller).await.unwrap().expect("within rank");
    assert_eq!(hit.row_rank(), Some(100));

    assert!(optimizer.lookup(&query().with_limit(150)).await.unwrap().is_none());
    assert!(optimizer.lookup(&query()).await.unwrap().is_none());
    assert!(optimizer.lookup(&query().with_limit(10).with_distinct()).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_insufficient_first_hit_is_a_miss() {
    let store = Arc::new(InMemoryResultStore::new(100));
    let optimizer = optimizer_with(store.clone());
    let ordered = query().with_order_by(["order_id"]);
    let key = CacheKey::create(&ordered).unwrap();

    // Partial entry under the exact key, complete entry under a looser one
    let partial = CachedResult::new(vec![Row::new(row(1))], Some(1), None);
    store.put(&optimizer.cache_name(), key.clone(), Arc::new(partial)).await.unwrap();
    store
        .put(
            &optimizer.cache_name(),
            key.without_order(),
            Arc::new(CachedResult::complete(vec![Row::new(row(1)), Row::new(row(2))])),
        )
        .await
        .unwrap();

    assert!(optimizer.lookup(&ordered.clone().with_limit(5)).await.unwrap().is_none());
    assert!(optimizer.lookup(&ordered.with_limit(1)).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_missing_fingerprint_is_configuration_error() {
    let (optimizer, _) = optimizer();
    let err = optimizer.lookup(&QueryDescriptor::default()).await.unwrap_err();
    assert!(matches!(err, OptimizerError::Configuration(_)));
    assert!(err.is_fatal());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_disabled_without_result_cache_strategy() {
    let store = Arc::new(InMemoryResultStore::new(10));
    let optimizer = DataServiceOptimizer::new(
        DataServiceDefinition::new("plain", "output"),
        config(),
        store,
        tokio::runtime::Handle::current(),
    );

    assert!(optimizer.lookup(&query()).await.unwrap().is_none());
    let run = FakeRun::new();
    assert!(matches!(
        optimizer.begin_populating(&query(), &run.as_execution()),
        Err(OptimizerError::Configuration(_))
    ));
}

// =============================================================================
// Population
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn populate_second_query_attaches_to_in_flight() {
    let (optimizer, _) = optimizer();
    let first_run = FakeRun::new();
    let second_run = FakeRun::new();

    let started = optimizer.begin_populating(&query(), &first_run.as_execution()).unwrap();
    let attached = optimizer.begin_populating(&query(), &second_run.as_execution()).unwrap();

    assert!(matches!(started, Population::Started(_)));
    assert!(attached.is_attached());
    assert_eq!(started.tracker().id(), attached.tracker().id());
    assert_eq!(optimizer.in_flight_count(), 1);
    assert!(optimizer.is_in_flight(&CacheKey::create(&query()).unwrap()));
    // Attaching never claims the second run
    assert!(second_run.hooks.population_owner().is_none());

    let waiter = {
        let tracker = attached.tracker().clone();
        tokio::spawn(async move { tracker.result().await })
    };

    first_run.start();
    first_run.emit(row(1));
    first_run.emit(row(2));
    first_run.finish(StepOutcome::finished());

    let result = waiter.await.unwrap().unwrap();
    assert_eq!(result.len(), 2);
    settle(&optimizer).await;
    assert!(optimizer.lookup(&query()).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_unlimited_query_does_not_join_capped_population() {
    let (optimizer, store) = optimizer();
    let capped_run = FakeRun::new();
    let full_run = FakeRun::new();

    let capped = optimizer.begin_populating(&query().with_limit(2), &capped_run.as_execution()).unwrap();
    let full = optimizer.begin_populating(&query(), &full_run.as_execution()).unwrap();

    assert!(matches!(full, Population::Started(_)));
    assert_ne!(capped.tracker().id(), full.tracker().id());
    assert!(full_run.hooks.population_owner().is_some());
    assert_eq!(optimizer.in_flight_count(), 1);

    // Later joiners find the wider capture
    let narrow = optimizer.begin_populating(&query().with_limit(1), &FakeRun::new().as_execution()).unwrap();
    assert!(narrow.is_attached());
    assert_eq!(narrow.tracker().id(), full.tracker().id());

    capped_run.start();
    full_run.start();
    for id in 1..=2 {
        capped_run.emit(row(id));
    }
    capped_run.finish(StepOutcome::stopped());
    for _ in 0..200 {
        if !store.is_empty(&optimizer.cache_name()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for id in 1..=5 {
        full_run.emit(row(id));
    }
    full_run.finish(StepOutcome::finished());
    settle(&optimizer).await;

    let hit = optimizer.lookup(&query()).await.unwrap().expect("unlimited query cached");
    assert!(hit.is_complete());
    assert_eq!(hit.len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_same_run_twice_reports_already_tracked() {
    let (optimizer, _) = optimizer();
    let run = FakeRun::new();

    optimizer.begin_populating(&query(), &run.as_execution()).unwrap();
    let other = QueryDescriptor::new(7).with_filter(FilterNode::eq("customer", "globex"));
    let err = optimizer.begin_populating(&other, &run.as_execution()).unwrap_err();

    assert!(matches!(err, OptimizerError::AlreadyTracked { .. }));
    assert!(!err.is_fatal());
    assert_eq!(optimizer.in_flight_count(), 1);
    assert!(!optimizer.is_in_flight(&CacheKey::create(&other).unwrap()));
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_failure_is_not_cached() {
    let (optimizer, store) = optimizer();
    populate(&optimizer, &query(), 2, StepOutcome::failed("source went away")).await;

    assert!(optimizer.lookup(&query()).await.unwrap().is_none());
    assert!(store.is_empty(&optimizer.cache_name()));
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_bad_row_fails_only_that_key() {
    let (optimizer, _) = optimizer();
    let bad = FakeRun::new();
    let good = FakeRun::new();
    let other = QueryDescriptor::new(7).with_filter(FilterNode::eq("customer", "globex"));

    let failing = optimizer.begin_populating(&query(), &bad.as_execution()).unwrap();
    optimizer.begin_populating(&other, &good.as_execution()).unwrap();
    bad.start();
    good.start();

    bad.emit(vec![json!(1)]);
    good.emit(row(1));
    good.finish(StepOutcome::finished());
    bad.finish(StepOutcome::finished());
    settle(&optimizer).await;

    assert_eq!(failing.tracker().state(), PopulationState::Failed);
    assert!(optimizer.lookup(&query()).await.unwrap().is_none());
    assert!(optimizer.lookup(&other).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_partial_never_replaces_complete() {
    let (optimizer, _) = optimizer();
    populate(&optimizer, &query(), 5, StepOutcome::finished()).await;
    populate(&optimizer, &query().with_limit(2), 2, StepOutcome::stopped()).await;

    let hit = optimizer.lookup(&query()).await.unwrap().expect("complete entry kept");
    assert!(hit.is_complete());
    assert_eq!(hit.len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_complete_evicts_earlier_partial_under_ordered_key() {
    let (optimizer, store) = optimizer();
    let ordered = query().with_order_by(["order_id"]);
    let key = CacheKey::create(&ordered).unwrap();

    populate(&optimizer, &ordered.clone().with_limit(2), 2, StepOutcome::stopped()).await;
    assert!(store.get(&optimizer.cache_name(), &key).await.unwrap().is_some());
    assert!(optimizer.lookup(&ordered).await.unwrap().is_none());

    populate(&optimizer, &ordered, 5, StepOutcome::finished()).await;

    let hit = optimizer.lookup(&ordered).await.unwrap().expect("complete result reachable");
    assert!(hit.is_complete());
    assert_eq!(hit.len(), 5);
    assert!(store.get(&optimizer.cache_name(), &key).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_partial_after_complete_is_not_stored() {
    let (optimizer, store) = optimizer();
    let ordered = query().with_order_by(["order_id"]);

    populate(&optimizer, &ordered, 5, StepOutcome::finished()).await;
    populate(&optimizer, &ordered.clone().with_limit(2), 2, StepOutcome::stopped()).await;

    assert_eq!(store.len(&optimizer.cache_name()), 1);
    let hit = optimizer.lookup(&ordered).await.unwrap().expect("complete entry kept");
    assert!(hit.is_complete());
    assert_eq!(hit.len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn populate_shared_in_flight_map() {
    let in_flight: InFlightMap = Arc::new(dashmap::DashMap::new());
    let store = Arc::new(InMemoryResultStore::new(10));
    let a = optimizer_with(store.clone()).with_in_flight(in_flight.clone());
    let b = optimizer_with(store).with_in_flight(in_flight.clone());

    a.begin_populating(&query(), &FakeRun::new().as_execution()).unwrap();
    let population = b.begin_populating(&query(), &FakeRun::new().as_execution()).unwrap();

    assert!(population.is_attached());
    assert_eq!(in_flight.len(), 1);
}

// =============================================================================
// Replay
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn replay_target_stopping_after_one_row_delivers_one() {
    let (optimizer, _) = optimizer();
    let rows = (1..=3).map(|id| Row::new(row(id))).collect();
    let source = ReplaySource::Cached(Arc::new(CachedResult::complete(rows)));
    let target = FakeRun::stopping_after(Some(1));

    let handle = optimizer.replay(source, target.clone()).unwrap();
    assert_eq!(handle.delivered().await.unwrap(), 1);
    assert_eq!(target.injected(), vec![json!(1)]);
    assert_eq!(target.injector.finished.load(Ordering::SeqCst), 1);
    assert_eq!(
        *target.rewired.lock(),
        vec!["startup:read_orders".to_string(), "drain:read_orders".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_cached_hit_end_to_end() {
    let (optimizer, _) = optimizer();
    populate(&optimizer, &query(), 4, StepOutcome::finished()).await;

    let hit = optimizer.lookup(&query()).await.unwrap().unwrap();
    let target = FakeRun::new();
    let delivered = optimizer
        .replay(ReplaySource::Cached(hit), target.clone())
        .unwrap()
        .delivered()
        .await
        .unwrap();

    assert_eq!(delivered, 4);
    assert_eq!(target.injected(), vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_live_population_streams_rows() {
    let (optimizer, _) = optimizer();
    let source_run = FakeRun::new();
    let population = optimizer.begin_populating(&query(), &source_run.as_execution()).unwrap();

    let target = FakeRun::new();
    let handle = optimizer
        .replay(ReplaySource::Live(population.tracker().clone()), target.clone())
        .unwrap();

    source_run.start();
    source_run.emit(row(1));
    tokio::time::sleep(Duration::from_millis(20)).await;
    source_run.emit(row(2));
    source_run.emit(row(3));
    source_run.finish(StepOutcome::finished());

    assert_eq!(handle.delivered().await.unwrap(), 3);
    assert_eq!(target.injected(), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(target.injector.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_live_population_failure_is_reported() {
    let (optimizer, _) = optimizer();
    let source_run = FakeRun::new();
    let population = optimizer.begin_populating(&query(), &source_run.as_execution()).unwrap();

    let target = FakeRun::new();
    let handle = optimizer
        .replay(ReplaySource::Live(population.tracker().clone()), target.clone())
        .unwrap();

    source_run.start();
    source_run.emit(row(1));
    source_run.finish(StepOutcome::failed("source died"));

    let err = handle.delivered().await.unwrap_err();
    assert_eq!(err, OptimizerError::PopulationFailed("source died".into()));
    assert_eq!(target.injected(), vec![json!(1)]);
    assert_eq!(target.injector.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_live_population_that_never_starts_times_out() {
    let (optimizer, _) = optimizer();
    let source_run = FakeRun::new();
    let population = optimizer.begin_populating(&query(), &source_run.as_execution()).unwrap();

    let target = FakeRun::new();
    let err = optimizer
        .replay(ReplaySource::Live(population.tracker().clone()), target.clone())
        .unwrap()
        .delivered()
        .await
        .unwrap_err();

    assert!(matches!(err, OptimizerError::Timeout { .. }));
    assert!(target.injected().is_empty());
}

// =============================================================================
// Push-down
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn pushdown_and_keeps_mapped_conjuncts() {
    let (optimizer, _) = optimizer();
    let filter = FilterNode::all_of(vec![
        FilterNode::eq("order_id", 1),
        FilterNode::eq("note", "x"),
        FilterNode::eq("customer", "acme"),
    ]);

    let pushed = optimizer.rewrite_for_step(&filter, "read_orders").unwrap();
    assert_eq!(
        pushed,
        FilterNode::all_of(vec![FilterNode::eq("id", 1), FilterNode::eq("cust", "acme")])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pushdown_or_with_unmapped_branch_is_skipped() {
    let (optimizer, _) = optimizer();
    let filter = FilterNode::eq("order_id", 1).or(FilterNode::eq("note", "x"));

    assert!(optimizer.rewrite_for_step(&filter, "read_orders").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn pushdown_unknown_step_is_skipped() {
    let (optimizer, _) = optimizer();
    assert!(optimizer
        .rewrite_for_step(&FilterNode::eq("order_id", 1), "output")
        .is_none());
}
