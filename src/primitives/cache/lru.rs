use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use tracing::trace;

use super::BlockCache;

/// Least-recently-used block cache.
pub struct LruBlockCache {
    entries: LruCache<u64, Bytes>,
}

impl LruBlockCache {
    /// Creates a cache holding at most `capacity` blocks.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }
}

impl BlockCache for LruBlockCache {
    fn read(&mut self, offset: u64, len: usize) -> Option<Bytes> {
        // a length mismatch is a miss and must not promote the entry
        if self.entries.peek(&offset).map(Bytes::len) != Some(len) {
            return None;
        }
        self.entries.get(&offset).cloned()
    }

    fn update(&mut self, offset: u64, block: Bytes) {
        if let Some((evicted, _)) = self.entries.push(offset, block) {
            if evicted != offset {
                trace!(evicted, "cache.lru.evict");
            }
        }
    }

    fn remove(&mut self, offset: u64) {
        self.entries.pop(&offset);
    }

    fn contains(&self, offset: u64) -> bool {
        self.entries.contains(&offset)
    }

    fn peek(&self, offset: u64) -> Option<&Bytes> {
        self.entries.peek(&offset)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
