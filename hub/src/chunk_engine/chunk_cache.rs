use std::{num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;

/// The indices of a chunk in the chunk grid.
type ChunkIndices = Vec<u64>;

/// A least-recently-used cache of decoded chunks.
///
/// A capacity of zero disables the cache.
pub(crate) struct ChunkCache {
    cache: Option<Mutex<LruCache<ChunkIndices, Arc<Vec<u8>>>>>,
}

impl ChunkCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }

    pub(crate) fn get(&self, chunk_indices: &[u64]) -> Option<Arc<Vec<u8>>> {
        self.cache.as_ref()?.lock().get(chunk_indices).cloned()
    }

    pub(crate) fn insert(&self, chunk_indices: &[u64], chunk: Arc<Vec<u8>>) {
        if let Some(cache) = &self.cache {
            cache.lock().put(chunk_indices.to_vec(), chunk);
        }
    }

    pub(crate) fn remove(&self, chunk_indices: &[u64]) {
        if let Some(cache) = &self.cache {
            cache.lock().pop(chunk_indices);
        }
    }

    pub(crate) fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_cache_evicts_least_recently_used() {
        let cache = ChunkCache::new(2);
        cache.insert(&[0], Arc::new(vec![0]));
        cache.insert(&[1], Arc::new(vec![1]));
        assert!(cache.get(&[0]).is_some());
        cache.insert(&[2], Arc::new(vec![2]));
        assert!(cache.get(&[1]).is_none());
        assert_eq!(cache.get(&[0]).as_deref(), Some(&vec![0]));
        cache.remove(&[0]);
        assert!(cache.get(&[0]).is_none());
        cache.clear();
        assert!(cache.get(&[2]).is_none());
    }

    #[test]
    fn chunk_cache_disabled() {
        let cache = ChunkCache::new(0);
        cache.insert(&[0], Arc::new(vec![0]));
        assert!(cache.get(&[0]).is_none());
    }
}
