#![forbid(unsafe_code)]
//! Fixed-size block I/O over one file and one [`BlockCache`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{LeafError, Result};
use crate::primitives::cache::{BlockCache, CachePolicy};
use crate::primitives::io::{FileIo, StdFileIo};

/// Snapshot of block store counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    /// Reads served from the cache.
    pub cache_hits: u64,
    /// Reads that went to the file.
    pub cache_misses: u64,
    /// Writes that reached the file.
    pub writes: u64,
    /// Writes skipped because the cache already held identical bytes.
    pub writes_elided: u64,
    /// Blocks appended to the file.
    pub allocations: u64,
}

/// Counters maintained by a [`BlockStore`].
#[derive(Default, Debug)]
pub struct StoreStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    writes: AtomicU64,
    writes_elided: AtomicU64,
    allocations: AtomicU64,
}

impl StoreStats {
    /// Captures the current counter values.
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            cache_hits: self.cache_hits.load(AtomicOrdering::Relaxed),
            cache_misses: self.cache_misses.load(AtomicOrdering::Relaxed),
            writes: self.writes.load(AtomicOrdering::Relaxed),
            writes_elided: self.writes_elided.load(AtomicOrdering::Relaxed),
            allocations: self.allocations.load(AtomicOrdering::Relaxed),
        }
    }

    /// Publishes the counters as one tracing event.
    pub fn emit_tracing(&self) {
        let snap = self.snapshot();
        debug!(
            cache_hits = snap.cache_hits,
            cache_misses = snap.cache_misses,
            writes = snap.writes,
            writes_elided = snap.writes_elided,
            allocations = snap.allocations,
            "store.stats"
        );
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// Owns one file handle and one cache; blocks are addressed by byte offset.
///
/// Allocation only ever appends at end-of-file. The store does no locking of
/// its own, callers serialize access.
pub struct BlockStore {
    path: Option<PathBuf>,
    io: Arc<dyn FileIo>,
    cache: Box<dyn BlockCache>,
    size: u64,
    stats: Arc<StoreStats>,
}

impl BlockStore {
    /// Opens or creates the file at `path`.
    pub fn open(path: impl AsRef<Path>, policy: CachePolicy) -> Result<Self> {
        let path = path.as_ref();
        let io = StdFileIo::open(path)?;
        let mut store = Self::with_io(Arc::new(io), policy.build())?;
        store.path = Some(path.to_path_buf());
        debug!(path = %path.display(), size = store.size, "store.open");
        Ok(store)
    }

    /// Builds a store over an arbitrary [`FileIo`].
    pub fn with_io(io: Arc<dyn FileIo>, cache: Box<dyn BlockCache>) -> Result<Self> {
        let size = io.len()?;
        Ok(Self {
            path: None,
            io,
            cache,
            size,
            stats: Arc::new(StoreStats::default()),
        })
    }

    /// Path of the backing file, when opened from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current file length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Shared handle to the store counters.
    pub fn stats(&self) -> Arc<StoreStats> {
        Arc::clone(&self.stats)
    }

    /// Number of blocks currently cached.
    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    /// Grows the file by `n` zero bytes and returns the offset of the new region.
    pub fn allocate(&mut self, n: u64) -> Result<u64> {
        let offset = self.size;
        let new_size = offset
            .checked_add(n)
            .ok_or_else(|| LeafError::InvalidArgument("file size overflow".into()))?;
        self.io.truncate(new_size)?;
        self.size = new_size;
        StoreStats::bump(&self.stats.allocations);
        trace!(offset, len = n, "store.allocate");
        Ok(offset)
    }

    /// Writes `bytes` at `offset` unless the cache already holds identical bytes.
    pub fn write_block(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if self.cache.peek(offset).is_some_and(|cached| cached.as_ref() == bytes) {
            StoreStats::bump(&self.stats.writes_elided);
            trace!(offset, len = bytes.len(), "store.write_block.elided");
            return Ok(());
        }
        if let Err(err) = self.io.write_at(offset, bytes) {
            // the file region is now unknown, stop trusting the cached copy
            self.cache.remove(offset);
            return Err(err);
        }
        let end = offset + bytes.len() as u64;
        if end > self.size {
            self.size = end;
        }
        StoreStats::bump(&self.stats.writes);
        self.cache.update(offset, Bytes::copy_from_slice(bytes));
        Ok(())
    }

    /// Returns `len` bytes at `offset`, from the cache when possible.
    pub fn read_block(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        if let Some(cached) = self.cache.read(offset, len) {
            StoreStats::bump(&self.stats.cache_hits);
            return Ok(cached);
        }
        StoreStats::bump(&self.stats.cache_misses);
        let mut buf = vec![0u8; len];
        self.io.read_at(offset, &mut buf)?;
        let block = Bytes::from(buf);
        self.cache.update(offset, block.clone());
        Ok(block)
    }

    /// Flushes file data and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.io.sync_all()
    }

    /// Syncs and releases the file handle.
    pub fn close(self) -> Result<()> {
        self.sync()?;
        debug!(size = self.size, "store.close");
        Ok(())
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("cached_blocks", &self.cache.len())
            .finish()
    }
}
