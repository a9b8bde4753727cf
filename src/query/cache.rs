use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

/// Tier 1: memoizes a sanitized query string's resolved PMID set for the
/// lifetime of a single job. Never persisted, never evicted — a job only
/// ever resolves a bounded number of distinct leaf terms.
#[derive(Default)]
pub struct LeafCache {
    entries: Mutex<HashMap<String, Arc<HashSet<u32>>>>,
}

impl LeafCache {
    pub fn new() -> Self {
        LeafCache::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<HashSet<u32>>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, value: Arc<HashSet<u32>>) {
        self.entries.lock().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SharedCacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl SharedCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Tier 3, optional: a cache keyed by sanitized query string shared across
/// jobs (and potentially processes). This crate defines the contract; a
/// caller wires in a real remote-backed implementation. Read failures must
/// be non-fatal — callers degrade to disk on any `None`/error.
pub trait SharedQueryCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u32>>;
    fn put(&self, key: &str, pmids: &[u32]);
}

/// The crate's own in-process implementation, used standalone and in tests.
/// Insertion never evicts on a key collision; it simply loses the race,
/// which is harmless since entries are a pure function of the key.
pub struct InProcessSharedCache {
    cache: Mutex<LruCache<String, Vec<u32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InProcessSharedCache {
    pub fn new(capacity: usize) -> Self {
        InProcessSharedCache {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> SharedCacheStats {
        SharedCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl SharedQueryCache for InProcessSharedCache {
    fn get(&self, key: &str) -> Option<Vec<u32>> {
        let mut cache = self.cache.lock();
        let found = cache.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn put(&self, key: &str, pmids: &[u32]) {
        self.cache.lock().put(key.to_string(), pmids.to_vec());
    }
}

/// §4.4.4's eligibility rule: only cache results that are small, or came
/// from a multi-token query (single common tokens churn the cache for
/// little benefit).
pub fn eligible_for_shared_cache(result_len: usize, is_multi_token: bool) -> bool {
    result_len < 10_000 || is_multi_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_cache_roundtrips() {
        let cache = InProcessSharedCache::new(10);
        assert!(cache.get("cancer").is_none());
        cache.put("cancer", &[1, 2, 3]);
        assert_eq!(cache.get("cancer"), Some(vec![1, 2, 3]));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn eligibility_rule() {
        assert!(eligible_for_shared_cache(5, false));
        assert!(!eligible_for_shared_cache(20_000, false));
        assert!(eligible_for_shared_cache(20_000, true));
    }
}
