//! File-based streaming cache with TTL-gated LRU eviction
//!
//! Stores byte streams on disk under hashed keys, each with an optional JSON
//! metadata sidecar. An in-memory index is rebuilt from the directory on open,
//! the total footprint is bounded by evicting the oldest entries first, and an
//! entry younger than the configured time-to-live is never evicted.

pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod types;

mod evict;
mod index;

pub use cache::StreamCache;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use types::{CacheEntry, CacheStats, CachedStream, WriteState};
