//! Keyed result storage.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryResultStore, StoreStats};
pub use traits::{ResultStore, StorageError};
