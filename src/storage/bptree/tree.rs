use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{LeafError, Result};
use crate::primitives::store::{BlockStore, StoreStatsSnapshot};
use crate::storage::block::{conforms, BlockDims, KeyBlock, Record};

use super::cursor::RangeCursor;
use super::dirty::DirtyBlocks;
use super::meta::{TreeMetadata, TreeSchema, META_OFFSET};
use super::options::{InternalLayout, TreeOptions};
use super::stats::{TreeStats, TreeStatsSnapshot};
use super::verify::{self, VerifyReport};

/// State guarded by the tree-wide lock.
pub(crate) struct TreeCore {
    pub(crate) store: BlockStore,
    pub(crate) meta: TreeMetadata,
    pub(crate) leaf_dims: Arc<BlockDims>,
    pub(crate) internal_dims: Arc<BlockDims>,
    pub(crate) layout: InternalLayout,
    pub(crate) sync_on_insert: bool,
    pub(crate) stats: Arc<TreeStats>,
}

impl TreeCore {
    fn block_size(&self) -> u64 {
        self.leaf_dims.block_size() as u64
    }

    fn check_offset(&self, offset: u64) -> Result<()> {
        let bs = self.block_size();
        if offset == META_OFFSET || offset % bs != 0 || offset + bs > self.store.size() {
            return Err(LeafError::corruption(
                offset,
                format!("block offset outside file of {} bytes", self.store.size()),
            ));
        }
        Ok(())
    }

    /// Reads the block at `offset`, expecting a leaf when `level == 0`.
    pub(crate) fn load(&mut self, offset: u64, level: u32) -> Result<KeyBlock> {
        self.check_offset(offset)?;
        let dims = if level == 0 {
            Arc::clone(&self.leaf_dims)
        } else {
            Arc::clone(&self.internal_dims)
        };
        KeyBlock::load(&mut self.store, dims, offset)
    }

    /// Like [`TreeCore::load`] but prefers an image already modified in `dirty`.
    pub(crate) fn fetch(
        &mut self,
        offset: u64,
        level: u32,
        dirty: &DirtyBlocks,
    ) -> Result<KeyBlock> {
        match dirty.get(offset) {
            Some(block) => Ok(block.clone()),
            None => self.load(offset, level),
        }
    }

    /// Child slot to follow from internal `node` when looking for `key`.
    pub(crate) fn child_slot(&self, node: &KeyBlock, key: &[u8]) -> usize {
        let (i, found) = node.find(key);
        match self.layout {
            InternalLayout::EqualPointers if found => i,
            InternalLayout::EqualPointers => i.saturating_sub(1),
            InternalLayout::Classic if found => i + 1,
            InternalLayout::Classic => i,
        }
    }

    pub(crate) fn child_pointer(&self, node: &KeyBlock, slot: usize) -> Result<u64> {
        node.pointer(slot).ok_or_else(|| {
            LeafError::corruption(
                node.offset(),
                format!(
                    "child slot {slot} missing, block holds {} pointers",
                    node.pointer_count()
                ),
            )
        })
    }

    /// Walks from the root to the leaf responsible for `key`.
    pub(crate) fn descend_to_leaf(&mut self, key: &[u8]) -> Result<KeyBlock> {
        let mut offset = self.meta.root();
        let mut level = self.meta.height();
        while level > 0 {
            let node = self.load(offset, level)?;
            let slot = self.child_slot(&node, key);
            offset = self.child_pointer(&node, slot)?;
            level -= 1;
        }
        self.load(offset, 0)
    }

    pub(crate) fn get(&mut self, key: &[u8]) -> Result<Option<Record>> {
        self.stats.inc_lookups();
        let mut leaf = self.descend_to_leaf(key)?;
        loop {
            let (i, found) = leaf.find(key);
            if found {
                return Ok(leaf.record(i).cloned());
            }
            let past_end = leaf.last_key().is_some_and(|last| last < key);
            match leaf.extra() {
                Some(next) if past_end => leaf = self.load(next, 0)?,
                _ => return Ok(None),
            }
        }
    }

    fn create(
        mut store: BlockStore,
        leaf_dims: Arc<BlockDims>,
        internal_dims: Arc<BlockDims>,
        options: &TreeOptions,
    ) -> Result<Self> {
        let block_size = options.block_size as u64;
        let meta_offset = store.allocate(block_size)?;
        if meta_offset != META_OFFSET {
            return Err(LeafError::corruption(meta_offset, "metadata block not at file start"));
        }
        let root = KeyBlock::allocate(&mut store, Arc::clone(&leaf_dims))?;
        root.write(&mut store)?;
        let meta = TreeMetadata::new(
            options.block_size as u32,
            root.offset(),
            TreeSchema::of(options),
        );
        meta.write(&mut store)?;
        Ok(Self {
            store,
            meta,
            leaf_dims,
            internal_dims,
            layout: options.internal_layout,
            sync_on_insert: options.sync_on_insert,
            stats: Arc::new(TreeStats::default()),
        })
    }

    fn reopen(
        mut store: BlockStore,
        leaf_dims: Arc<BlockDims>,
        internal_dims: Arc<BlockDims>,
        options: &TreeOptions,
    ) -> Result<Self> {
        let size = store.size();
        let block_size = options.block_size as u64;
        if size % block_size != 0 {
            return Err(LeafError::corruption(
                size,
                format!("file size {size} is not a multiple of {block_size}"),
            ));
        }
        let meta = TreeMetadata::load(&mut store, options.block_size as u32)?;
        meta.check_schema(&TreeSchema::of(options))?;
        let mut core = Self {
            store,
            meta,
            leaf_dims,
            internal_dims,
            layout: options.internal_layout,
            sync_on_insert: options.sync_on_insert,
            stats: Arc::new(TreeStats::default()),
        };
        core.load(core.meta.root(), core.meta.height())?;
        Ok(core)
    }
}

/// Disk-resident B+Tree over fixed-size keys and records.
///
/// All operations take one tree-wide lock. A [`RangeCursor`] keeps that
/// lock until it is closed or dropped, so calling back into the tree while
/// a cursor is alive on the same thread deadlocks.
pub struct BPlusTree {
    core: Mutex<TreeCore>,
    options: TreeOptions,
    stats: Arc<TreeStats>,
}

impl BPlusTree {
    /// Opens the tree stored at `path`, creating an empty one if the file is empty.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        key_size: usize,
        field_sizes: &[usize],
        block_size: usize,
    ) -> Result<Self> {
        Self::open_with_options(path, TreeOptions::new(key_size, field_sizes, block_size))
    }

    /// Opens or creates the tree at `path` using `options`.
    pub fn open_with_options(path: impl AsRef<Path>, options: TreeOptions) -> Result<Self> {
        let path = path.as_ref();
        options.dims()?;
        let store = BlockStore::open(path, options.cache)?;
        let tree = Self::with_store(store, options)?;
        info!(
            path = %path.display(),
            height = tree.height(),
            entries = tree.size(),
            "bptree.open"
        );
        Ok(tree)
    }

    /// Builds a tree on an already opened store.
    pub fn with_store(store: BlockStore, options: TreeOptions) -> Result<Self> {
        let (leaf, internal) = options.dims()?;
        let (leaf, internal) = (Arc::new(leaf), Arc::new(internal));
        let core = if store.size() == 0 {
            debug!(block_size = options.block_size, "bptree.create");
            TreeCore::create(store, leaf, internal, &options)?
        } else {
            TreeCore::reopen(store, leaf, internal, &options)?
        };
        let stats = Arc::clone(&core.stats);
        Ok(Self {
            core: Mutex::new(core),
            options,
            stats,
        })
    }

    /// Options the tree was opened with.
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Inserts a record. Returns `Ok(false)` when the key or fields do not
    /// match the schema.
    pub fn insert<F: AsRef<[u8]>>(&self, key: &[u8], fields: &[F]) -> Result<bool> {
        if key.len() != self.options.key_size || !conforms(fields, &self.options.field_sizes) {
            debug!(key_len = key.len(), "bptree.insert.rejected");
            return Ok(false);
        }
        let record = Record::new(
            key,
            fields.iter().map(|field| field.as_ref().to_vec()).collect(),
        );
        self.core.lock().insert(record)?;
        Ok(true)
    }

    /// Returns the first record stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        if key.len() != self.options.key_size {
            return Ok(None);
        }
        self.core.lock().get(key)
    }

    /// Returns whether any record is stored under `key`.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of records stored.
    pub fn size(&self) -> u64 {
        self.core.lock().meta.entries()
    }

    /// Levels above the leaf level.
    pub fn height(&self) -> u32 {
        self.core.lock().meta.height()
    }

    /// Offset of the root block.
    pub fn root_offset(&self) -> u64 {
        self.core.lock().meta.root()
    }

    /// Opens a cursor over every record with `left <= key <= right`.
    ///
    /// The cursor is empty when either bound has the wrong width or
    /// `right < left`.
    pub fn find(&self, left: &[u8], right: &[u8]) -> Result<RangeCursor<'_>> {
        let guard = self.core.lock();
        let width = self.options.key_size;
        if left.len() != width || right.len() != width || right < left {
            return Ok(RangeCursor::empty(guard));
        }
        RangeCursor::open(guard, left, right)
    }

    /// Walks every block and reports structural problems.
    pub fn verify(&self) -> Result<VerifyReport> {
        verify::verify_tree(&mut self.core.lock())
    }

    /// Tree counters.
    pub fn stats(&self) -> TreeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Block store counters.
    pub fn store_stats(&self) -> StoreStatsSnapshot {
        self.core.lock().store.stats().snapshot()
    }

    /// Flushes the file to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.core.lock().store.sync()
    }

    /// Syncs and closes the file. Dropping the tree also closes it, without the sync.
    pub fn close(self) -> Result<()> {
        self.stats.emit_tracing();
        self.core.into_inner().store.close()
    }

    #[cfg(test)]
    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut TreeCore) -> R) -> R {
        f(&mut self.core.lock())
    }
}

impl std::fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
