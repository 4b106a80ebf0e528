// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter Trees
//!
//! Boolean predicate trees produced by the external SQL layer.
//!
//! # Architecture
//!
//! ```text
//! FilterNode (AST)
//!     ↓
//!     ├─→ canonical_where → cache key WHERE text
//!     └─→ pushdown::rewrite → upstream step vocabulary
//! ```

mod canonical;
mod node;

pub use canonical::{canonical_where, render, simplify};
pub use node::{Comparator, Condition, FilterBuilder, FilterNode, Literal, Operator};
