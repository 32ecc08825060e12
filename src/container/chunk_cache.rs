//! Decoded chunk cache.
//!
//! Count and offset tables are read one entry at a time, which would
//! otherwise decode the same (possibly compressed) chunk over and over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::util::ArrayData;

/// Cache of decoded chunks keyed by their file position.
///
/// Uses `parking_lot::RwLock` for the map and an atomic for the size
/// counter so lookups never take the write lock.
pub struct ChunkCache {
    entries: RwLock<HashMap<u64, (Arc<ArrayData>, usize)>>,
    max_size: usize,
    current_size: AtomicUsize,
}

impl ChunkCache {
    /// Create a cache holding at most `max_size` decoded bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size,
            current_size: AtomicUsize::new(0),
        }
    }

    /// Cached chunk at `pos`, if any.
    #[inline]
    pub fn get(&self, pos: u64) -> Option<Arc<ArrayData>> {
        self.entries.read().get(&pos).map(|(d, _)| Arc::clone(d))
    }

    /// Insert a decoded chunk of `size` bytes.
    pub fn insert(&self, pos: u64, data: Arc<ArrayData>, size: usize) {
        if size > self.max_size {
            return;
        }
        if self.current_size.load(Ordering::Relaxed) + size > self.max_size {
            self.evict_some();
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&pos) {
            return;
        }
        entries.insert(pos, (data, size));
        self.current_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Drop roughly half of the entries.
    fn evict_some(&self) {
        let mut entries = self.entries.write();
        let keys: Vec<u64> = entries.keys().copied().collect();
        let mut evicted = 0;
        for key in keys.into_iter().take(entries.len().div_ceil(2)) {
            if let Some((_, size)) = entries.remove(&key) {
                evicted += size;
            }
        }
        let _ = self
            .current_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(evicted))
            });
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded bytes currently held.
    #[inline]
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(32 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: usize) -> Arc<ArrayData> {
        Arc::new(ArrayData::from(vec![0u8; n]))
    }

    #[test]
    fn test_insert_get() {
        let cache = ChunkCache::new(1024);
        cache.insert(64, chunk(10), 10);
        assert_eq!(cache.get(64).map(|d| d.len()), Some(10));
        assert!(cache.get(128).is_none());
        assert_eq!(cache.size(), 10);
    }

    #[test]
    fn test_eviction_and_skip_large() {
        let cache = ChunkCache::new(50);
        for i in 0..10u64 {
            cache.insert(i * 100, chunk(10), 10);
        }
        assert!(cache.size() <= 50);
        assert!(cache.len() <= 5);

        cache.insert(9999, chunk(200), 200);
        assert!(cache.get(9999).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }
}
