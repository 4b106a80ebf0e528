//! Configuration for the data-service optimizer.
//!
//! # Example
//!
//! ```
//! use dataservice_optimizer::OptimizerConfig;
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = OptimizerConfig::default();
//! assert_eq!(config.cache_name_prefix, "dataservice_cache_");
//! assert_eq!(config.poll_interval(), Duration::from_millis(50));
//!
//! // Tuned config
//! let config = OptimizerConfig {
//!     replay_put_timeout_ms: 20,
//!     replay_startup_timeout_ms: 2_000,
//!     ..Default::default()
//! };
//! assert_eq!(config.replay_startup_timeout(), Duration::from_secs(2));
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Configuration for caching, population and replay.
///
/// All fields have defaults, so an empty document deserializes.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Prefix for physical cache-store names (`prefix + service name`)
    #[serde(default = "default_cache_name_prefix")]
    pub cache_name_prefix: String,

    /// How long a blocked row reader waits before re-checking liveness
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timed wait for a single replayed row to be accepted by the target
    #[serde(default = "default_replay_put_timeout_ms")]
    pub replay_put_timeout_ms: u64,

    /// Deadline for a live population to start before replay gives up
    #[serde(default = "default_replay_startup_timeout_ms")]
    pub replay_startup_timeout_ms: u64,

    /// Entry bound per physical cache in the in-memory store
    #[serde(default = "default_max_entries_per_cache")]
    pub max_entries_per_cache: usize,
}

fn default_cache_name_prefix() -> String { "dataservice_cache_".to_string() }
fn default_poll_interval_ms() -> u64 { 50 }
fn default_replay_put_timeout_ms() -> u64 { 50 }
fn default_replay_startup_timeout_ms() -> u64 { 30_000 }
fn default_max_entries_per_cache() -> usize { 1000 }

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cache_name_prefix: default_cache_name_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
            replay_put_timeout_ms: default_replay_put_timeout_ms(),
            replay_startup_timeout_ms: default_replay_startup_timeout_ms(),
            max_entries_per_cache: default_max_entries_per_cache(),
        }
    }
}

impl OptimizerConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn replay_put_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_put_timeout_ms.max(1))
    }

    #[must_use]
    pub fn replay_startup_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_startup_timeout_ms)
    }

    /// Fast timings for tests
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            poll_interval_ms: 5,
            replay_put_timeout_ms: 5,
            replay_startup_timeout_ms: 200,
            ..Default::default()
        }
    }
}
