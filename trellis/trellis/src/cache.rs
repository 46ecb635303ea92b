//! Bounded recency caches that short-circuit existence checks.
//!
//! A cache only remembers that a key was seen to exist. A hit skips the
//! storage round-trip, a miss falls through to storage and a positive answer
//! is remembered. When the cache is full the least recently used entries are
//! evicted in one batch.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis_core::config::CacheConfig;
use trellis_core::TrellisId;

/// Counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU set of keys known to exist.
pub struct ReferenceCache<K: Hash + Eq> {
    entries: Mutex<LruCache<K, ()>>,
    enabled: bool,
    capacity: usize,
    evict_count: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq> ReferenceCache<K> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            enabled: config.enabled && config.capacity > 0,
            capacity: config.capacity,
            evict_count: config.evict_count.clamp(1, config.capacity.max(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Whether `key` is cached. Counts a hit or a miss and refreshes the
    /// key's recency on a hit.
    pub fn contains(&self, key: &K) -> bool {
        if !self.enabled {
            return false;
        }
        let hit = self.entries.lock().get(key).is_some();
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    pub fn insert(&self, key: K) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.contains(&key) {
            entries.promote(&key);
            return;
        }
        if entries.len() >= self.capacity {
            let mut evicted = 0usize;
            while evicted < self.evict_count && entries.pop_lru().is_some() {
                evicted += 1;
            }
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        entries.put(key, ());
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().pop(key);
    }

    /// Drop every entry. Used after bulk deletes.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Tenant key.
pub type TenantKey = TrellisId;
/// `(tenant, graph)`.
pub type GraphKey = (TrellisId, TrellisId);
/// `(tenant, graph, node or edge)`.
pub type MemberKey = (TrellisId, TrellisId, TrellisId);

/// The four caches a client keeps.
pub struct ReferenceCaches {
    pub tenants: ReferenceCache<TenantKey>,
    pub graphs: ReferenceCache<GraphKey>,
    pub nodes: ReferenceCache<MemberKey>,
    pub edges: ReferenceCache<MemberKey>,
}

impl ReferenceCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            tenants: ReferenceCache::new(config),
            graphs: ReferenceCache::new(config),
            nodes: ReferenceCache::new(config),
            edges: ReferenceCache::new(config),
        }
    }

    pub fn stats(&self) -> ClientCacheStats {
        ClientCacheStats {
            tenants: self.tenants.stats(),
            graphs: self.graphs.stats(),
            nodes: self.nodes.stats(),
            edges: self.edges.stats(),
        }
    }
}

/// Per-entity cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientCacheStats {
    pub tenants: CacheStats,
    pub graphs: CacheStats,
    pub nodes: CacheStats,
    pub edges: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize, evict_count: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            capacity,
            evict_count,
        }
    }

    #[test]
    fn test_hit_and_miss_counting() {
        let cache = ReferenceCache::new(&config(10, 2));
        assert!(!cache.contains(&1));
        cache.insert(1);
        assert!(cache.contains(&1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_batch_eviction_drops_least_recent() {
        let cache = ReferenceCache::new(&config(4, 2));
        for key in 0..4 {
            cache.insert(key);
        }
        // Touch 0 so 1 and 2 are the least recent.
        assert!(cache.contains(&0));

        cache.insert(4);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 2);
        assert!(cache.contains(&0));
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
        assert!(!cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = ReferenceCache::new(&config(8, 1));
        cache.insert("a");
        cache.insert("b");
        cache.invalidate(&"a");
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let mut disabled = config(8, 1);
        disabled.enabled = false;
        let cache = ReferenceCache::new(&disabled);
        cache.insert(7);
        assert!(!cache.contains(&7));
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
