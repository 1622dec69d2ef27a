use bytes::Bytes;
use tracing::warn;

use crate::error::Result;
use crate::primitives::store::BlockStore;
use crate::storage::block::KeyBlock;

/// Blocks modified by one structural change, written together at the end.
///
/// Blocks at or past `fresh_from` were allocated by the change and are
/// written first, so no existing block ever points at an unwritten one.
/// Existing blocks are then rewritten in the order they were recorded,
/// which is leaf level upward since the insert unwinds from the leaf.
#[derive(Debug)]
pub(crate) struct DirtyBlocks {
    fresh_from: u64,
    blocks: Vec<KeyBlock>,
}

impl DirtyBlocks {
    /// Tracks a change to a file that was `fresh_from` bytes long when it began.
    pub(crate) fn new(fresh_from: u64) -> Self {
        Self {
            fresh_from,
            blocks: Vec::new(),
        }
    }

    /// Records `block`, replacing an earlier image of the same offset.
    pub(crate) fn insert(&mut self, block: KeyBlock) {
        match self
            .blocks
            .iter_mut()
            .find(|held| held.offset() == block.offset())
        {
            Some(slot) => *slot = block,
            None => self.blocks.push(block),
        }
    }

    /// Latest image of the block at `offset`, if it was touched.
    pub(crate) fn get(&self, offset: u64) -> Option<&KeyBlock> {
        self.blocks.iter().find(|held| held.offset() == offset)
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Serializes every touched block to `store`.
    ///
    /// On a failed write the existing blocks already overwritten are
    /// restored before the error is returned. On success the returned
    /// [`Rollback`] can still undo the change.
    pub(crate) fn sync(self, store: &mut BlockStore) -> Result<Rollback> {
        let fresh_from = self.fresh_from;
        let (fresh, existing): (Vec<KeyBlock>, Vec<KeyBlock>) = self
            .blocks
            .into_iter()
            .partition(|block| block.offset() >= fresh_from);
        for block in &fresh {
            block.write(store)?;
        }
        let mut rollback = Rollback::default();
        for block in &existing {
            let before = store.read_block(block.offset(), block.dims().block_size())?;
            rollback.images.push((block.offset(), before));
            if let Err(err) = block.write(store) {
                rollback.restore(store);
                return Err(err);
            }
        }
        Ok(rollback)
    }
}

/// Images of existing blocks taken just before a sync overwrote them.
#[derive(Debug, Default)]
pub(crate) struct Rollback {
    images: Vec<(u64, Bytes)>,
}

impl Rollback {
    /// Writes the saved images back, newest first.
    ///
    /// Failures are logged and skipped so every other image still gets written.
    pub(crate) fn restore(self, store: &mut BlockStore) {
        for (offset, image) in self.images.into_iter().rev() {
            if let Err(err) = store.write_block(offset, &image) {
                warn!(offset, error = %err, "bptree.rollback.failed");
            }
        }
    }
}
