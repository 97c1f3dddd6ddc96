//! Caching primitives shared by the partition manager and search orchestrator.

mod lru;

pub use lru::{CacheStats, LruCache};
