use parking_lot::MutexGuard;
use tracing::trace;

use crate::error::Result;
use crate::storage::block::{KeyBlock, Record};

use super::tree::TreeCore;

/// Pull-based scan over `[left, right]` in ascending key order.
///
/// Holds the tree lock for its whole life; [`RangeCursor::close`] or drop
/// releases it. After the first error the cursor yields nothing more.
pub struct RangeCursor<'a> {
    core: MutexGuard<'a, TreeCore>,
    leaf: Option<KeyBlock>,
    slot: usize,
    left: Vec<u8>,
    right: Vec<u8>,
    yielded: u64,
}

impl<'a> RangeCursor<'a> {
    pub(crate) fn empty(core: MutexGuard<'a, TreeCore>) -> Self {
        Self {
            core,
            leaf: None,
            slot: 0,
            left: Vec::new(),
            right: Vec::new(),
            yielded: 0,
        }
    }

    pub(crate) fn open(
        mut core: MutexGuard<'a, TreeCore>,
        left: &[u8],
        right: &[u8],
    ) -> Result<Self> {
        core.stats.inc_range_scans();
        let leaf = core.descend_to_leaf(left)?;
        let (slot, _) = leaf.find(left);
        Ok(Self {
            core,
            leaf: Some(leaf),
            slot,
            left: left.to_vec(),
            right: right.to_vec(),
            yielded: 0,
        })
    }

    /// Ends the scan and releases the tree lock.
    pub fn close(self) {}

    /// True once the scan has run out of records.
    pub fn is_done(&self) -> bool {
        self.leaf.is_none()
    }

    fn advance(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(leaf) = self.leaf.as_ref() else {
                return Ok(None);
            };
            if let Some(record) = leaf.record(self.slot) {
                if record.key() > self.right.as_slice() {
                    return Ok(None);
                }
                self.slot += 1;
                if record.key() < self.left.as_slice() {
                    continue;
                }
                self.yielded += 1;
                return Ok(Some(record.clone()));
            }
            match leaf.extra() {
                Some(next) => {
                    let next_leaf = self.core.load(next, 0)?;
                    self.leaf = Some(next_leaf);
                    self.slot = 0;
                }
                None => return Ok(None),
            }
        }
    }
}

impl Iterator for RangeCursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                if self.leaf.take().is_some() {
                    trace!(yielded = self.yielded, "bptree.range.finished");
                }
                None
            }
            Err(err) => {
                self.leaf = None;
                Some(Err(err))
            }
        }
    }
}
