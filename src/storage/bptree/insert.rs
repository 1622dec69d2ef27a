use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{LeafError, Result};
use crate::storage::block::{KeyBlock, Record};

use super::dirty::DirtyBlocks;
use super::options::InternalLayout;
use super::tree::TreeCore;

/// A block that split in two; the parent must learn about `right`.
#[derive(Debug)]
pub(crate) struct Split {
    pub(crate) separator: Vec<u8>,
    pub(crate) right: u64,
}

impl TreeCore {
    /// Inserts `record`, splitting as needed, and persists every touched block.
    ///
    /// A failed write leaves the committed tree in place: existing blocks are
    /// restored and block 0 still names the old root, height and count.
    pub(crate) fn insert(&mut self, record: Record) -> Result<()> {
        let mut dirty = DirtyBlocks::new(self.store.size());
        let root = self.meta.root();
        let height = self.meta.height();
        let split = self.insert_into(root, height, &record, &mut dirty)?;
        let new_root = match split {
            Some(split) => Some(self.grow_root(root, height, split, &mut dirty)?),
            None => None,
        };
        let touched = dirty.len();
        let rollback = dirty.sync(&mut self.store)?;
        if let Err(err) = self.meta.record_insert(&mut self.store, new_root) {
            rollback.restore(&mut self.store);
            return Err(err);
        }
        if let Some(new_root) = new_root {
            debug!(root = new_root, height = height + 1, "bptree.root_split");
        }
        if self.sync_on_insert {
            self.store.sync()?;
        }
        self.stats.inc_inserts();
        trace!(touched, entries = self.meta.entries(), "bptree.insert");
        Ok(())
    }

    fn insert_into(
        &mut self,
        offset: u64,
        level: u32,
        record: &Record,
        dirty: &mut DirtyBlocks,
    ) -> Result<Option<Split>> {
        if level == 0 {
            return self.insert_into_leaf(offset, record, dirty);
        }
        let mut node = self.fetch(offset, level, dirty)?;
        let mut lowered = false;
        let slot = match self.layout {
            InternalLayout::EqualPointers => {
                let (i, found) = node.find(record.key());
                if !found && i == 0 {
                    // record 0 is the lower bound of child 0, keep it at the subtree minimum
                    node.set_key(0, record.key())?;
                    lowered = true;
                }
                self.child_slot(&node, record.key())
            }
            InternalLayout::Classic => self.child_slot(&node, record.key()),
        };
        let child = self.child_pointer(&node, slot)?;
        match self.insert_into(child, level - 1, record, dirty)? {
            None => {
                if lowered {
                    dirty.insert(node);
                }
                Ok(None)
            }
            Some(split) => self.place_separator(node, split, dirty),
        }
    }

    fn insert_into_leaf(
        &mut self,
        offset: u64,
        record: &Record,
        dirty: &mut DirtyBlocks,
    ) -> Result<Option<Split>> {
        let mut leaf = self.fetch(offset, 0, dirty)?;
        if !leaf.is_full() {
            leaf.add(record.clone())?;
            dirty.insert(leaf);
            return Ok(None);
        }
        let run_key = match leaf.first_key() {
            Some(key) => key.to_vec(),
            None => return Err(LeafError::Capacity(format!("leaf at {offset} has no room"))),
        };
        if leaf.count(&run_key) == leaf.record_count() {
            return self.insert_beside_run(leaf, run_key, record, dirty);
        }
        self.split_leaf(leaf, record, dirty).map(Some)
    }

    /// Handles a full leaf whose records all carry `run_key`.
    fn insert_beside_run(
        &mut self,
        mut head: KeyBlock,
        run_key: Vec<u8>,
        record: &Record,
        dirty: &mut DirtyBlocks,
    ) -> Result<Option<Split>> {
        if record.key() < run_key.as_slice() {
            let mut moved = KeyBlock::allocate(&mut self.store, Arc::clone(&self.leaf_dims))?;
            let (records, _) = head.take_entries();
            for run_record in records {
                moved.append(run_record)?;
            }
            moved.set_extra(head.extra())?;
            head.set_extra(Some(moved.offset()))?;
            head.add(record.clone())?;
            let right = moved.offset();
            dirty.insert(head);
            dirty.insert(moved);
            self.stats.inc_leaf_splits();
            debug!(right, "bptree.split.leaf.run_moved");
            return Ok(Some(Split {
                separator: run_key,
                right,
            }));
        }

        let mut last = self.last_in_run(head, &run_key, dirty)?;
        if record.key() == run_key.as_slice() && !last.is_full() {
            last.add(record.clone())?;
            dirty.insert(last);
            return Ok(None);
        }
        let mut fresh = KeyBlock::allocate(&mut self.store, Arc::clone(&self.leaf_dims))?;
        fresh.add(record.clone())?;
        fresh.set_extra(last.extra())?;
        last.set_extra(Some(fresh.offset()))?;
        let right = fresh.offset();
        dirty.insert(last);
        dirty.insert(fresh);
        if record.key() == run_key.as_slice() {
            self.stats.inc_overflow_leaves();
            debug!(offset = right, "bptree.overflow_leaf");
            return Ok(None);
        }
        self.stats.inc_leaf_splits();
        debug!(right, "bptree.split.leaf.after_run");
        Ok(Some(Split {
            separator: record.key().to_vec(),
            right,
        }))
    }

    /// Follows the leaf chain to the last block starting with `run_key`.
    fn last_in_run(
        &mut self,
        head: KeyBlock,
        run_key: &[u8],
        dirty: &DirtyBlocks,
    ) -> Result<KeyBlock> {
        let mut current = head;
        while let Some(next) = current.extra() {
            let candidate = self.fetch(next, 0, dirty)?;
            if candidate.first_key() != Some(run_key) {
                break;
            }
            current = candidate;
        }
        Ok(current)
    }

    fn split_leaf(
        &mut self,
        mut leaf: KeyBlock,
        record: &Record,
        dirty: &mut DirtyBlocks,
    ) -> Result<Split> {
        let (at, _) = leaf.find(record.key());
        let (mut records, _) = leaf.take_entries();
        records.insert(at, record.clone());
        let cut = split_point(&records).ok_or_else(|| {
            LeafError::Capacity(format!("leaf at {} cannot be split", leaf.offset()))
        })?;
        let upper = records.split_off(cut);
        let separator = upper[0].key().to_vec();

        let mut sibling = KeyBlock::allocate(&mut self.store, Arc::clone(&self.leaf_dims))?;
        for lower in records {
            leaf.append(lower)?;
        }
        for upper in upper {
            sibling.append(upper)?;
        }
        sibling.set_extra(leaf.extra())?;
        leaf.set_extra(Some(sibling.offset()))?;

        let right = sibling.offset();
        debug!(
            left = leaf.offset(),
            right,
            lower = leaf.record_count(),
            upper = sibling.record_count(),
            "bptree.split.leaf"
        );
        dirty.insert(leaf);
        dirty.insert(sibling);
        self.stats.inc_leaf_splits();
        Ok(Split { separator, right })
    }

    fn place_separator(
        &mut self,
        mut node: KeyBlock,
        split: Split,
        dirty: &mut DirtyBlocks,
    ) -> Result<Option<Split>> {
        if !node.is_full() {
            let at = node.add(Record::key_only(split.separator))?;
            let slot = match self.layout {
                InternalLayout::EqualPointers => at,
                InternalLayout::Classic => at + 1,
            };
            node.insert_pointer(slot, split.right)?;
            dirty.insert(node);
            return Ok(None);
        }
        self.split_internal(node, split, dirty).map(Some)
    }

    fn split_internal(
        &mut self,
        mut node: KeyBlock,
        split: Split,
        dirty: &mut DirtyBlocks,
    ) -> Result<Split> {
        let (mut keys, mut pointers) = node.take_entries();
        let at = keys.partition_point(|held| held.key() < split.separator.as_slice());
        keys.insert(at, Record::key_only(split.separator));
        let mid = keys.len() / 2;
        let (separator, upper_keys, upper_pointers) = match self.layout {
            InternalLayout::EqualPointers => {
                pointers.insert(at, split.right);
                let upper_keys = keys.split_off(mid);
                let upper_pointers = pointers.split_off(mid);
                (upper_keys[0].key().to_vec(), upper_keys, upper_pointers)
            }
            InternalLayout::Classic => {
                pointers.insert(at + 1, split.right);
                let mut upper_keys = keys.split_off(mid);
                let promoted = upper_keys.remove(0);
                let upper_pointers = pointers.split_off(mid + 1);
                (promoted.key().to_vec(), upper_keys, upper_pointers)
            }
        };

        let mut sibling = KeyBlock::allocate(&mut self.store, Arc::clone(&self.internal_dims))?;
        fill(&mut node, keys, pointers)?;
        fill(&mut sibling, upper_keys, upper_pointers)?;
        let right = sibling.offset();
        debug!(left = node.offset(), right, "bptree.split.internal");
        dirty.insert(node);
        dirty.insert(sibling);
        self.stats.inc_internal_splits();
        Ok(Split { separator, right })
    }

    /// Allocates a new root above `old_root` and the block it split into.
    fn grow_root(
        &mut self,
        old_root: u64,
        old_height: u32,
        split: Split,
        dirty: &mut DirtyBlocks,
    ) -> Result<u64> {
        let mut root = KeyBlock::allocate(&mut self.store, Arc::clone(&self.internal_dims))?;
        match self.layout {
            InternalLayout::EqualPointers => {
                let old = self.fetch(old_root, old_height, dirty)?;
                let low = old
                    .first_key()
                    .ok_or_else(|| LeafError::corruption(old_root, "split root is empty"))?
                    .to_vec();
                fill(
                    &mut root,
                    vec![Record::key_only(low), Record::key_only(split.separator)],
                    vec![old_root, split.right],
                )?;
            }
            InternalLayout::Classic => {
                fill(
                    &mut root,
                    vec![Record::key_only(split.separator)],
                    vec![old_root, split.right],
                )?;
            }
        }
        self.stats.inc_root_splits();
        let offset = root.offset();
        dirty.insert(root);
        Ok(offset)
    }
}

fn fill(block: &mut KeyBlock, records: Vec<Record>, pointers: Vec<u64>) -> Result<()> {
    for record in records {
        block.append(record)?;
    }
    for (slot, ptr) in pointers.into_iter().enumerate() {
        block.insert_pointer(slot, ptr)?;
    }
    Ok(())
}

/// Index splitting `records` into two halves without separating a run of
/// equal keys; the half sizes differ by at most one when no run straddles
/// the middle.
fn split_point(records: &[Record]) -> Option<usize> {
    let total = records.len();
    if total < 2 {
        return None;
    }
    let mid = total / 2;
    let key = records[mid].key();
    if records[mid - 1].key() != key {
        return Some(mid);
    }
    let mut start = mid;
    while start > 0 && records[start - 1].key() == key {
        start -= 1;
    }
    let mut end = mid;
    while end < total && records[end].key() == key {
        end += 1;
    }
    let below = (start > 0).then_some(start);
    let above = (end < total).then_some(end);
    match (below, above) {
        (Some(b), Some(a)) => Some(if mid - b <= a - mid { b } else { a }),
        (one, other) => one.or(other),
    }
}
