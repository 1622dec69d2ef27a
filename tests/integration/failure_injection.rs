#![allow(missing_docs)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use leafdb::{
    primitives::{
        cache::CachePolicy,
        io::{FileIo, StdFileIo},
        store::BlockStore,
    },
    BPlusTree, LeafError, Result, TreeOptions,
};
use tempfile::tempdir;

const UNLIMITED: usize = usize::MAX;

/// File wrapper whose operations can be switched to fail.
struct FlakyIo {
    inner: StdFileIo,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_sync: AtomicBool,
    writes: AtomicUsize,
    /// Writes still allowed before the next one fails.
    write_budget: AtomicUsize,
    /// Lift the budget again after the first write it refuses.
    budget_once: AtomicBool,
}

impl FlakyIo {
    fn open(path: &Path) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            inner: StdFileIo::open(path)?,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            write_budget: AtomicUsize::new(UNLIMITED),
            budget_once: AtomicBool::new(false),
        }))
    }

    /// Lets `writes` more writes through, then fails the next one; with
    /// `once` every later write succeeds again.
    fn fail_after_writes(&self, writes: usize, once: bool) {
        self.budget_once.store(once, Ordering::SeqCst);
        self.write_budget.store(writes, Ordering::SeqCst);
    }

    fn budget_allows_write(&self) -> bool {
        let left = self
            .write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                UNLIMITED | 0 => None,
                left => Some(left - 1),
            });
        if left != Err(0) {
            return true;
        }
        if self.budget_once.load(Ordering::SeqCst) {
            self.write_budget.store(UNLIMITED, Ordering::SeqCst);
        }
        false
    }

    fn injected(what: &str) -> LeafError {
        LeafError::Io(io::Error::new(io::ErrorKind::Other, format!("injected {what} failure")))
    }
}

impl FileIo for FlakyIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("read"));
        }
        self.inner.read_at(off, dst)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) || !self.budget_allows_write() {
            return Err(Self::injected("write"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_at(off, src)
    }

    fn sync_all(&self) -> Result<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(Self::injected("sync"));
        }
        self.inner.sync_all()
    }

    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.inner.truncate(len)
    }
}

fn options() -> TreeOptions {
    TreeOptions {
        cache: CachePolicy::None,
        ..TreeOptions::new(4, &[4], 128)
    }
}

fn key(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

fn flaky_tree(path: &Path, options: &TreeOptions) -> Result<(Arc<FlakyIo>, BPlusTree)> {
    let io = FlakyIo::open(path)?;
    let store = BlockStore::with_io(io.clone(), options.cache.build())?;
    let tree = BPlusTree::with_store(store, options.clone())?;
    Ok((io, tree))
}

#[test]
fn failed_write_surfaces_as_io_and_leaves_file_consistent() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("flaky.db");
    let (io, tree) = flaky_tree(&path, &options())?;
    for v in 0..50u32 {
        tree.insert(&key(v), &[key(v)])?;
    }
    let before = io.writes.load(Ordering::SeqCst);

    io.fail_writes.store(true, Ordering::SeqCst);
    let err = tree.insert(&key(500), &[key(500)]).unwrap_err();
    assert!(matches!(err, LeafError::Io(_)), "{err:?}");
    assert_eq!(io.writes.load(Ordering::SeqCst), before);
    io.fail_writes.store(false, Ordering::SeqCst);
    drop(tree);

    let reopened = BPlusTree::open_with_options(&path, options())?;
    assert_eq!(reopened.size(), 50);
    assert!(!reopened.contains(&key(500))?);
    assert!(reopened.contains(&key(49))?);
    assert!(reopened.verify()?.success);
    Ok(())
}

#[test]
fn failed_read_surfaces_as_io() -> Result<()> {
    let dir = tempdir()?;
    let (io, tree) = flaky_tree(&dir.path().join("reads.db"), &options())?;
    for v in 0..20u32 {
        tree.insert(&key(v), &[key(v)])?;
    }
    io.fail_reads.store(true, Ordering::SeqCst);
    assert!(matches!(tree.get(&key(3)), Err(LeafError::Io(_))));
    assert!(matches!(tree.find(&key(0), &key(9)).map(|_| ()), Err(LeafError::Io(_))));

    io.fail_reads.store(false, Ordering::SeqCst);
    assert!(tree.contains(&key(3))?);
    Ok(())
}

#[test]
fn read_failure_mid_scan_ends_the_cursor() -> Result<()> {
    let dir = tempdir()?;
    let (io, tree) = flaky_tree(&dir.path().join("scan.db"), &options())?;
    for v in 0..100u32 {
        tree.insert(&key(v), &[key(v)])?;
    }
    let mut cursor = tree.find(&key(0), &key(99))?;
    assert!(matches!(cursor.next(), Some(Ok(_))));
    io.fail_reads.store(true, Ordering::SeqCst);
    let outcome: Vec<_> = cursor.by_ref().collect();
    assert!(matches!(outcome.last(), Some(Err(LeafError::Io(_)))));
    assert_eq!(outcome.iter().filter(|item| item.is_err()).count(), 1);
    assert!(cursor.next().is_none());
    Ok(())
}

#[test]
fn failed_sync_is_reported_when_syncing_every_insert() -> Result<()> {
    let dir = tempdir()?;
    let options = TreeOptions {
        sync_on_insert: true,
        ..options()
    };
    let (io, tree) = flaky_tree(&dir.path().join("sync.db"), &options)?;
    tree.insert(&key(1), &[key(1)])?;
    io.fail_sync.store(true, Ordering::SeqCst);
    assert!(matches!(tree.insert(&key(2), &[key(2)]), Err(LeafError::Io(_))));
    assert!(matches!(tree.sync(), Err(LeafError::Io(_))));
    io.fail_sync.store(false, Ordering::SeqCst);
    tree.sync()?;
    Ok(())
}

/// Leaf capacity for `options()`: (128 - 13) / 8.
const LEAF_CAPACITY: u32 = 14;

fn full_root_leaf(path: &Path) -> Result<(Arc<FlakyIo>, BPlusTree)> {
    let (io, tree) = flaky_tree(path, &options())?;
    for v in 0..LEAF_CAPACITY {
        tree.insert(&key(v), &[key(v)])?;
    }
    Ok((io, tree))
}

fn assert_holds_first_leaf(tree: &BPlusTree) -> Result<()> {
    assert_eq!(tree.size(), u64::from(LEAF_CAPACITY));
    for v in 0..LEAF_CAPACITY {
        assert_eq!(tree.get(&key(v))?.map(|r| r.key().to_vec()), Some(key(v).to_vec()));
    }
    assert!(!tree.contains(&key(LEAF_CAPACITY))?);
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    Ok(())
}

#[test]
fn every_failed_write_of_a_root_split_keeps_committed_records() -> Result<()> {
    let dir = tempdir()?;
    let mut failures = 0;
    for allowed in 0.. {
        let path = dir.path().join(format!("split-{allowed}.db"));
        let (io, tree) = full_root_leaf(&path)?;
        io.fail_after_writes(allowed, true);
        match tree.insert(&key(LEAF_CAPACITY), &[key(LEAF_CAPACITY)]) {
            Ok(_) => {
                assert_eq!(tree.size(), u64::from(LEAF_CAPACITY) + 1);
                break;
            }
            Err(err) => {
                assert!(matches!(err, LeafError::Io(_)), "write {allowed}: {err:?}");
                failures += 1;
            }
        }
        assert_holds_first_leaf(&tree)?;
        drop(tree);

        let reopened = BPlusTree::open_with_options(&path, options())?;
        assert_holds_first_leaf(&reopened)?;
        reopened.insert(&key(LEAF_CAPACITY), &[key(LEAF_CAPACITY)])?;
        assert!(reopened.contains(&key(LEAF_CAPACITY))?);
        assert!(reopened.verify()?.success);
    }
    // sibling, new root, old leaf and block 0
    assert_eq!(failures, 4);
    Ok(())
}

#[test]
fn write_failure_while_placing_new_blocks_loses_nothing() -> Result<()> {
    let dir = tempdir()?;
    // the writes stay down, so the failure lands before any existing block changes
    for allowed in 0..=2 {
        let path = dir.path().join(format!("down-{allowed}.db"));
        let (io, tree) = full_root_leaf(&path)?;
        io.fail_after_writes(allowed, false);
        let err = tree
            .insert(&key(LEAF_CAPACITY), &[key(LEAF_CAPACITY)])
            .unwrap_err();
        assert!(matches!(err, LeafError::Io(_)), "{err:?}");
        assert_holds_first_leaf(&tree)?;
        drop(tree);

        let reopened = BPlusTree::open_with_options(&path, options())?;
        assert_holds_first_leaf(&reopened)?;
    }
    Ok(())
}
