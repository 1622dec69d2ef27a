use std::collections::BTreeSet;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::BlockCache;

struct LfuEntry {
    block: Bytes,
    hits: u64,
    stamp: u64,
}

/// Least-frequently-used block cache.
///
/// Entries are ranked by `(hits, stamp)`; among equally used blocks the one
/// touched longest ago is evicted first.
pub struct LfuBlockCache {
    capacity: usize,
    entries: FxHashMap<u64, LfuEntry>,
    rank: BTreeSet<(u64, u64, u64)>,
    clock: u64,
}

impl LfuBlockCache {
    /// Creates a cache holding at most `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: FxHashMap::default(),
            rank: BTreeSet::new(),
            clock: 0,
        }
    }

    /// Access count recorded for `offset`.
    pub fn hits(&self, offset: u64) -> Option<u64> {
        self.entries.get(&offset).map(|entry| entry.hits)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, offset: u64, replacement: Option<Bytes>) -> Option<Bytes> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(&offset)?;
        self.rank.remove(&(entry.hits, entry.stamp, offset));
        entry.hits += 1;
        entry.stamp = stamp;
        if let Some(block) = replacement {
            entry.block = block;
        }
        self.rank.insert((entry.hits, entry.stamp, offset));
        Some(entry.block.clone())
    }

    fn evict_one(&mut self) {
        if let Some((hits, _, victim)) = self.rank.pop_first() {
            self.entries.remove(&victim);
            trace!(victim, hits, "cache.lfu.evict");
        }
    }
}

impl BlockCache for LfuBlockCache {
    fn read(&mut self, offset: u64, len: usize) -> Option<Bytes> {
        if self.entries.get(&offset).map(|entry| entry.block.len()) != Some(len) {
            return None;
        }
        self.touch(offset, None)
    }

    fn update(&mut self, offset: u64, block: Bytes) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&offset) {
            self.touch(offset, Some(block));
            return;
        }
        while self.entries.len() >= self.capacity {
            self.evict_one();
        }
        let stamp = self.tick();
        self.rank.insert((1, stamp, offset));
        self.entries.insert(
            offset,
            LfuEntry {
                block,
                hits: 1,
                stamp,
            },
        );
    }

    fn remove(&mut self, offset: u64) {
        if let Some(entry) = self.entries.remove(&offset) {
            self.rank.remove(&(entry.hits, entry.stamp, offset));
        }
    }

    fn contains(&self, offset: u64) -> bool {
        self.entries.contains_key(&offset)
    }

    fn peek(&self, offset: u64) -> Option<&Bytes> {
        self.entries.get(&offset).map(|entry| &entry.block)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
