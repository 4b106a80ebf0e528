// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Capturing rows from a run and feeding them back into another.
//!
//! A [`PopulationTracker`] listens to one run's output step and resolves to a
//! [`CachedResult`](crate::cache::CachedResult). A [`CacheReplay`] pushes a
//! stored result, or a tracker that is still collecting, into a new run.

pub mod replay;
pub mod tracker;

pub use replay::{CacheReplay, ReplayHandle, ReplaySource, ReplayWiring};
pub use tracker::{PopulationEvent, PopulationOutcome, PopulationState, PopulationTracker, TrackedRows};
