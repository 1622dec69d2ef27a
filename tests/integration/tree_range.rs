#![allow(missing_docs)]

use std::collections::BTreeSet;

use leafdb::{BPlusTree, CachePolicy, InternalLayout, Result, TreeOptions};
use tempfile::{tempdir, TempDir};

fn open_tree(layout: InternalLayout) -> Result<(TempDir, BPlusTree)> {
    let dir = tempdir()?;
    let options = TreeOptions {
        internal_layout: layout,
        cache: CachePolicy::Lfu { capacity: 32 },
        ..TreeOptions::new(8, &[8], 256)
    };
    let tree = BPlusTree::open_with_options(dir.path().join("range.db"), options)?;
    Ok((dir, tree))
}

fn k(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

fn collect_keys(tree: &BPlusTree, left: u64, right: u64) -> Result<Vec<u64>> {
    tree.find(&k(left), &k(right))?
        .map(|record| {
            record.map(|r| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(r.key());
                u64::from_be_bytes(raw)
            })
        })
        .collect()
}

#[test]
fn every_window_matches_the_inserted_keys() -> Result<()> {
    for layout in [InternalLayout::EqualPointers, InternalLayout::Classic] {
        let (_dir, tree) = open_tree(layout)?;
        // fan out from the middle so both edges of the tree keep splitting
        let mut inserted = BTreeSet::new();
        for i in 0..500u64 {
            let v = if i % 2 == 0 { 500 + i } else { 500 - i };
            tree.insert(&k(v * 2), &[k(v)])?;
            inserted.insert(v * 2);
        }
        assert!(tree.height() >= 2);

        for (left, right) in [(0, 2_000), (1, 1), (2, 2), (101, 399), (998, 1_200), (1_995, 5_000)] {
            let expected: Vec<u64> = inserted.range(left..=right).copied().collect();
            assert_eq!(collect_keys(&tree, left, right)?, expected, "{layout:?} [{left}, {right}]");
        }
    }
    Ok(())
}

#[test]
fn fields_travel_with_their_keys() -> Result<()> {
    let (_dir, tree) = open_tree(InternalLayout::EqualPointers)?;
    for v in (0..300u64).rev() {
        tree.insert(&k(v), &[k(v * 7)])?;
    }
    for record in tree.find(&k(10), &k(250))? {
        let record = record?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(record.key());
        let key = u64::from_be_bytes(raw);
        assert_eq!(record.field(0), Some(&k(key * 7)[..]));
    }
    Ok(())
}

#[test]
fn degenerate_windows_are_empty() -> Result<()> {
    let (_dir, tree) = open_tree(InternalLayout::Classic)?;
    for v in 10..20u64 {
        tree.insert(&k(v), &[k(v)])?;
    }
    assert!(collect_keys(&tree, 15, 14)?.is_empty());
    assert!(collect_keys(&tree, 0, 9)?.is_empty());
    assert!(collect_keys(&tree, 20, 100)?.is_empty());
    assert_eq!(tree.find(&[0u8; 4], &k(100))?.count(), 0);

    let mut cursor = tree.find(&k(15), &k(14))?;
    assert!(cursor.next().is_none());
    assert!(cursor.is_done());
    Ok(())
}

#[test]
fn closing_or_dropping_a_cursor_releases_the_tree() -> Result<()> {
    let (_dir, tree) = open_tree(InternalLayout::EqualPointers)?;
    for v in 0..100u64 {
        tree.insert(&k(v), &[k(v)])?;
    }
    let mut cursor = tree.find(&k(0), &k(99))?;
    assert!(cursor.next().is_some());
    cursor.close();
    assert!(tree.insert(&k(500), &[k(500)])?);

    {
        let mut cursor = tree.find(&k(0), &k(1_000))?;
        cursor.next();
        cursor.next();
    }
    assert_eq!(tree.size(), 101);
    assert_eq!(collect_keys(&tree, 99, 1_000)?, vec![99, 500]);

    let stats = tree.stats();
    assert!(stats.range_scans >= 3);
    Ok(())
}

#[test]
fn cursor_is_fused_after_the_last_record() -> Result<()> {
    let (_dir, tree) = open_tree(InternalLayout::Classic)?;
    for v in 0..5u64 {
        tree.insert(&k(v), &[k(v)])?;
    }
    let mut cursor = tree.find(&k(0), &k(4))?;
    assert_eq!(cursor.by_ref().count(), 5);
    assert!(cursor.is_done());
    assert!(cursor.next().is_none());
    Ok(())
}
