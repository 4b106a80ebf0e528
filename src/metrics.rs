// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the optimizer.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `dataservice_` prefix for all metrics
//! - `_total` suffix for counters
//!
//! # Labels
//! - `service`: data-service name
//! - `outcome`: hit, miss, insufficient / complete, partial, failed / mapped, unmappable

use metrics::{counter, gauge};

/// Record a cache lookup outcome
pub fn record_lookup(service: &str, outcome: &str) {
    counter!(
        "dataservice_cache_lookups_total",
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record how a population resolved
pub fn record_population(service: &str, outcome: &str, rows: usize) {
    counter!(
        "dataservice_populations_total",
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    counter!(
        "dataservice_populated_rows_total",
        "service" => service.to_string()
    )
    .increment(rows as u64);
}

/// Record a query attaching to an in-flight population
pub fn record_attach(service: &str) {
    counter!(
        "dataservice_population_attach_total",
        "service" => service.to_string()
    )
    .increment(1);
}

/// Set number of populations currently in flight
pub fn set_in_flight(service: &str, count: usize) {
    gauge!(
        "dataservice_populations_in_flight",
        "service" => service.to_string()
    )
    .set(count as f64);
}

/// Record rows replayed into a run
pub fn record_replay(delivered: usize, dropped: usize) {
    counter!("dataservice_replayed_rows_total").increment(delivered as u64);
    if dropped > 0 {
        counter!("dataservice_replay_dropped_rows_total").increment(dropped as u64);
    }
}

/// Record a push-down rewrite outcome
pub fn record_pushdown(service: &str, step: &str, mapped: bool) {
    counter!(
        "dataservice_pushdown_total",
        "service" => service.to_string(),
        "step" => step.to_string(),
        "outcome" => if mapped { "mapped" } else { "unmappable" }
    )
    .increment(1);
}
