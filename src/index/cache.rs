use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::core::error::Result;
use crate::index::cdb::OnDiskIndex;
use crate::index::posting::PostingPayload;

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
}

/// The token-posting cache tier (§4.4.4): an LRU of deserialized postings
/// in front of the memory-mapped index, plus a running total of bytes
/// deserialized since the map was last (re)opened. Once that total passes
/// the configured budget the map is closed and reopened so the OS can
/// reclaim the pages it backed.
pub struct PostingCache {
    path: PathBuf,
    index: Mutex<Arc<OnDiskIndex>>,
    lru: Mutex<LruCache<String, Arc<PostingPayload>>>,
    bytes_deserialized: AtomicUsize,
    budget_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PostingCache {
    pub fn open(path: PathBuf, budget_bytes: usize) -> Result<Self> {
        let index = OnDiskIndex::open(&path)?;
        Ok(PostingCache {
            path,
            index: Mutex::new(Arc::new(index)),
            lru: Mutex::new(LruCache::new(NonZeroUsize::new(20_000).unwrap())),
            bytes_deserialized: AtomicUsize::new(0),
            budget_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn max_ngram_width(&self) -> usize {
        self.index.lock().max_ngram_width
    }

    pub fn store_unigram_positions(&self) -> bool {
        self.index.lock().store_unigram_positions()
    }

    pub fn get(&self, token: &str) -> Result<Option<Arc<PostingPayload>>> {
        if let Some(hit) = self.lru.lock().get(token) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(hit.clone()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let index = self.index.lock().clone();
        let Some(payload) = index.posting(token)? else { return Ok(None) };

        let approx_bytes = bincode::serialized_size(&payload).unwrap_or(0) as usize;
        let payload = Arc::new(payload);
        self.lru.lock().put(token.to_string(), payload.clone());

        let total = self.bytes_deserialized.fetch_add(approx_bytes, Ordering::Relaxed) + approx_bytes;
        if total > self.budget_bytes {
            self.reopen()?;
        }
        Ok(Some(payload))
    }

    fn reopen(&self) -> Result<()> {
        let fresh = OnDiskIndex::open(&self.path)?;
        *self.index.lock() = Arc::new(fresh);
        self.lru.lock().clear();
        self.bytes_deserialized.store(0, Ordering::Relaxed);
        eprintln!(
            "index cache: {} bytes deserialized, reopening mmap at {}",
            self.budget_bytes,
            self.path.display()
        );
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            size: self.lru.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocumentRecord;
    use crate::index::builder::{IndexBuilder, IndexBuilderConfig};
    use crate::index::cdb::write_index;
    use crate::progress::CancellationToken;
    use tempfile::tempdir;

    #[test]
    fn reopens_mmap_once_budget_is_exceeded() {
        let mut builder = IndexBuilder::new(IndexBuilderConfig::default());
        builder
            .add_document(1, 2020, &DocumentRecord { pmid: 1, title: Some("cancer".into()), ..Default::default() })
            .unwrap();
        let consolidated = builder.consolidate(&CancellationToken::new()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("index.cdb");
        write_index(&consolidated, &path, &dir.path().join("index.cdb.tmp")).unwrap();

        let cache = PostingCache::open(path, 1).unwrap();
        cache.get("cancer").unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
    }
}
