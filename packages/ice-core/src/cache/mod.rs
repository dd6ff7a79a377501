//! Bounded, eviction-hooked caches (C1) used both as the context store and as the I/O
//! optimizer's preload cache.

mod lru;

pub use lru::{BoundedCache, EvictHook};

use crate::types::FileContext;

/// Weight function for `FileContext` entries: raw content size in bytes, matching
/// spec.md §4.1's "explicit caller-supplied byte count".
pub fn file_context_weight(ctx: &FileContext) -> u64 {
    ctx.size
}
