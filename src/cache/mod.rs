// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process caches.
//!
//! - [`BoundedCacheMap`]: LRU + max-age map behind a single mutex
//! - [`ResolutionCache`]: generation-validated memo built on top of it

mod bounded_map;
mod resolution_cache;

pub use bounded_map::BoundedCacheMap;
pub use resolution_cache::{ResolutionCache, ResolutionCacheStats};
