// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Result cache model
//!
//! # Flow
//!
//! ```text
//! Query arrives
//!       │
//!       ▼
//! ┌──────────────────────────────────┐
//! │  CacheKey::create(query)         │
//! │  try exact → no order → bare     │
//! └──────────────────────────────────┘
//!       │
//!       ├─→ first hit + answers_query → replay cached rows
//!       │
//!       └─→ miss OR insufficient → run pipeline, populate
//! ```

mod key;
mod result;

pub use key::CacheKey;
pub use result::{rank, source_rank, CachedResult, UNBOUNDED};
