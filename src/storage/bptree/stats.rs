use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tracing::debug;

/// Snapshot of tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStatsSnapshot {
    /// Point lookups served.
    pub lookups: u64,
    /// Range cursors opened.
    pub range_scans: u64,
    /// Records inserted.
    pub inserts: u64,
    /// Leaf splits, including duplicate-run relocations.
    pub leaf_splits: u64,
    /// Internal node splits.
    pub internal_splits: u64,
    /// New roots created.
    pub root_splits: u64,
    /// Unindexed leaves appended to a duplicate run.
    pub overflow_leaves: u64,
}

/// Thread-safe counters for tree operations.
#[derive(Default, Debug)]
pub struct TreeStats {
    lookups: AtomicU64,
    range_scans: AtomicU64,
    inserts: AtomicU64,
    leaf_splits: AtomicU64,
    internal_splits: AtomicU64,
    root_splits: AtomicU64,
    overflow_leaves: AtomicU64,
}

impl TreeStats {
    /// Returns the number of leaf splits so far.
    pub fn leaf_splits(&self) -> u64 {
        self.leaf_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of internal splits so far.
    pub fn internal_splits(&self) -> u64 {
        self.internal_splits.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_lookups(&self) {
        self.lookups.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_range_scans(&self) {
        self.range_scans.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_internal_splits(&self) {
        self.internal_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_splits(&self) {
        self.root_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_overflow_leaves(&self) {
        self.overflow_leaves.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Captures a snapshot of all counters.
    pub fn snapshot(&self) -> TreeStatsSnapshot {
        TreeStatsSnapshot {
            lookups: self.lookups.load(AtomicOrdering::Relaxed),
            range_scans: self.range_scans.load(AtomicOrdering::Relaxed),
            inserts: self.inserts.load(AtomicOrdering::Relaxed),
            leaf_splits: self.leaf_splits(),
            internal_splits: self.internal_splits(),
            root_splits: self.root_splits.load(AtomicOrdering::Relaxed),
            overflow_leaves: self.overflow_leaves.load(AtomicOrdering::Relaxed),
        }
    }

    /// Emits the current counters through `tracing`.
    pub fn emit_tracing(&self) {
        let snap = self.snapshot();
        debug!(
            lookups = snap.lookups,
            range_scans = snap.range_scans,
            inserts = snap.inserts,
            leaf_splits = snap.leaf_splits,
            internal_splits = snap.internal_splits,
            root_splits = snap.root_splits,
            overflow_leaves = snap.overflow_leaves,
            "bptree.stats"
        );
    }
}
