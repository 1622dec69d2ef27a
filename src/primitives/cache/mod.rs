#![forbid(unsafe_code)]
//! In-memory block caches keyed by file offset.
//!
//! A cache never performs I/O. [`BlockStore`](crate::primitives::store::BlockStore)
//! consults it before touching the file and refreshes it after every read
//! and write.

use std::num::NonZeroUsize;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

mod lfu;
mod lru;
mod none;

pub use self::lfu::LfuBlockCache;
pub use self::lru::LruBlockCache;
pub use self::none::NoCache;

/// Default number of cached blocks.
pub const DEFAULT_CACHE_BLOCKS: usize = 1000;

/// Eviction-policy contract shared by all caches.
pub trait BlockCache: Send {
    /// Returns the cached bytes for `offset` when present with exactly `len` bytes.
    fn read(&mut self, offset: u64, len: usize) -> Option<Bytes>;
    /// Inserts or replaces the bytes cached for `offset`, evicting if full.
    fn update(&mut self, offset: u64, block: Bytes);
    /// Drops the entry for `offset`, if any.
    fn remove(&mut self, offset: u64);
    /// Returns whether `offset` is cached without touching its eviction rank.
    fn contains(&self, offset: u64) -> bool;
    /// Cached bytes for `offset`, leaving its eviction rank alone.
    fn peek(&self, offset: u64) -> Option<&Bytes>;
    /// Number of cached blocks.
    fn len(&self) -> usize;
    /// Returns true when nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Maximum number of cached blocks.
    fn capacity(&self) -> usize;
}

/// Cache selection used by tree options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CachePolicy {
    /// Least-recently-used eviction.
    Lru {
        /// Number of blocks kept.
        capacity: usize,
    },
    /// Least-frequently-used eviction.
    Lfu {
        /// Number of blocks kept.
        capacity: usize,
    },
    /// Caching disabled.
    None,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Lfu {
            capacity: DEFAULT_CACHE_BLOCKS,
        }
    }
}

impl CachePolicy {
    /// Instantiates the configured cache. A zero capacity disables caching.
    pub fn build(self) -> Box<dyn BlockCache> {
        match self {
            CachePolicy::Lru { capacity } => match NonZeroUsize::new(capacity) {
                Some(capacity) => Box::new(LruBlockCache::new(capacity)),
                None => Box::new(NoCache),
            },
            CachePolicy::Lfu { capacity } if capacity > 0 => {
                Box::new(LfuBlockCache::new(capacity))
            }
            CachePolicy::Lfu { .. } | CachePolicy::None => Box::new(NoCache),
        }
    }
}
