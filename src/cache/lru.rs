//! Generic thread-safe LRU cache with O(1) operations using `IndexMap`.
//!
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | insert | O(1) | Amortized |
//! | get | O(1) | With recency update |
//! | remove | O(1) | swap_remove |
//! | eviction | O(1) | shift_remove from front |

#![allow(clippy::cast_precision_loss)]

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculates the hit rate (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU cache.
///
/// Uses `IndexMap` internally, which preserves insertion order and gives
/// O(1) move-to-back. Front of the map is the least recently used entry.
pub struct LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    capacity: usize,
    inner: RwLock<IndexMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a new LRU cache with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(IndexMap::with_capacity(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the capacity of the cache.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns true if `key` is present without affecting recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Inserts a key-value pair, evicting the LRU entry if at capacity.
    ///
    /// Returns the evicted `(key, value)` pair, if an eviction happened, so
    /// the caller can flush it (e.g. save a dirty partition) before it is
    /// dropped. Re-inserting an already-present key moves it to the back
    /// without evicting anything.
    pub fn insert(&self, key: K, value: V) -> Option<(K, V)> {
        let mut inner = self.inner.write();

        if let Some(existing) = inner.shift_remove(&key) {
            inner.insert(key, value);
            drop(existing);
            return None;
        }

        let evicted = if inner.len() >= self.capacity {
            inner.shift_remove_index(0).inspect(|_| {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            })
        } else {
            None
        };

        inner.insert(key, value);
        evicted
    }

    /// Gets a value by key, moving it to the back (most recently used).
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let value = {
            let inner = self.inner.read();
            inner.get(key).cloned()
        };

        match value {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.move_to_back(key, &v);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Gets a value without updating recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        let inner = self.inner.read();
        inner.get(key).cloned()
    }

    /// Marks an existing key as most recently used without changing its value.
    pub fn touch(&self, key: &K) {
        if let Some(v) = self.peek(key) {
            self.move_to_back(key, &v);
        }
    }

    /// Removes a key from the cache, returning its value if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();
        inner.swap_remove(key)
    }

    /// Clears all entries, returning them in LRU-to-MRU order so the caller
    /// can flush each before dropping.
    pub fn drain(&self) -> Vec<(K, V)> {
        let mut inner = self.inner.write();
        inner.drain(..).collect()
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn move_to_back(&self, key: &K, value: &V) {
        let mut inner = self.inner.write();
        inner.shift_remove(key);
        inner.insert(key.clone(), value.clone());
    }
}

impl<K, V> Default for LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(2);
        assert_eq!(cache.insert("a", 1), None);
        assert_eq!(cache.insert("b", 2), None);
        // touch "a" so "b" becomes LRU
        assert_eq!(cache.get(&"a"), Some(1));
        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache: LruCache<&str, i32> = LruCache::new(4);
        cache.insert("x", 1);
        let _ = cache.get(&"x");
        let _ = cache.get(&"missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reinserting_existing_key_does_not_evict() {
        let cache = LruCache::new(1);
        assert_eq!(cache.insert("a", 1), None);
        assert_eq!(cache.insert("a", 2), None);
        assert_eq!(cache.peek(&"a"), Some(2));
    }

    #[test]
    fn drain_returns_all_entries() {
        let cache = LruCache::new(4);
        cache.insert("a", 1);
        cache.insert("b", 2);
        let drained = cache.drain();
        assert_eq!(drained.len(), 2);
        assert!(cache.is_empty());
    }
}
