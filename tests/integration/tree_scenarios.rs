#![allow(missing_docs)]

use std::sync::Arc;

use leafdb::{
    primitives::{cache::CachePolicy, store::BlockStore},
    storage::{
        block::{BlockDims, KeyBlock, Record},
        bptree::{BPlusTree, InternalLayout, TreeOptions},
    },
    LeafError, Result,
};
use tempfile::tempdir;

const KEY_SIZE: usize = 4;
const FIELDS: [usize; 3] = [1, 1, 2];
const BLOCK_SIZE: usize = 4096;

fn fields_for(k: u32) -> [Vec<u8>; 3] {
    [vec![k as u8], vec![(k >> 8) as u8], (k as u16).to_be_bytes().to_vec()]
}

fn scenario_a(layout: InternalLayout) -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("scenario_a.db");
    let options = TreeOptions {
        internal_layout: layout,
        ..TreeOptions::new(KEY_SIZE, &FIELDS, BLOCK_SIZE)
    };
    let leaf_dims = Arc::new(BlockDims::leaf(BLOCK_SIZE, KEY_SIZE, &FIELDS)?);
    let internal_dims = Arc::new(BlockDims::internal(layout.mode(), BLOCK_SIZE, KEY_SIZE)?);
    let capacity = leaf_dims.capacity() as u32;
    assert_eq!(capacity, 510);

    let tree = BPlusTree::open_with_options(&path, options)?;
    for k in 1..=capacity + 1 {
        assert!(tree.insert(&k.to_be_bytes(), &fields_for(k))?);
    }
    assert_eq!(tree.stats().leaf_splits, 1);
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.size(), u64::from(capacity) + 1);
    let root_offset = tree.root_offset();
    tree.close()?;

    let mut store = BlockStore::open(&path, CachePolicy::None)?;
    let root = KeyBlock::load(&mut store, internal_dims, root_offset)?;
    let separators: Vec<&[u8]> = match layout {
        InternalLayout::EqualPointers => {
            assert_eq!(root.record_count(), 2);
            assert_eq!(root.pointer_count(), 2);
            assert_eq!(root.first_key(), Some(&1u32.to_be_bytes()[..]));
            root.records()[1..].iter().map(Record::key).collect()
        }
        InternalLayout::Classic => {
            assert_eq!(root.pointer_count(), root.record_count() + 1);
            root.records().iter().map(Record::key).collect()
        }
    };
    assert_eq!(separators.len(), 1, "root holds exactly one separator");

    let left = KeyBlock::load(&mut store, Arc::clone(&leaf_dims), root.pointers()[0])?;
    let right = KeyBlock::load(&mut store, leaf_dims, root.pointers()[1])?;
    assert_eq!(left.extra(), Some(right.offset()));
    assert_eq!(right.extra(), None);
    assert_eq!(left.record_count() + right.record_count(), capacity as usize + 1);
    assert!(left.record_count().abs_diff(right.record_count()) <= 1);
    assert_eq!(right.first_key(), Some(separators[0]));
    assert!(left.last_key() < right.first_key());
    Ok(())
}

#[test]
fn scenario_a_single_split_equal_pointers() -> Result<()> {
    scenario_a(InternalLayout::EqualPointers)
}

#[test]
fn scenario_a_single_split_classic() -> Result<()> {
    scenario_a(InternalLayout::Classic)
}

#[test]
fn scenario_b_empty_tree_contains_nothing() -> Result<()> {
    let dir = tempdir()?;
    let tree = BPlusTree::open_or_create(dir.path().join("b.db"), KEY_SIZE, &FIELDS, BLOCK_SIZE)?;
    assert_eq!(tree.size(), 0);
    assert_eq!(tree.height(), 0);
    for k in [0u32, 1, 7, 1 << 20, u32::MAX] {
        assert!(!tree.contains(&k.to_be_bytes())?);
        assert!(tree.get(&k.to_be_bytes())?.is_none());
    }
    assert!(!tree.contains(b"too long key")?);
    assert_eq!(tree.find(&0u32.to_be_bytes(), &u32::MAX.to_be_bytes())?.count(), 0);
    Ok(())
}

#[test]
fn scenario_c_block_add_reverses_duplicates() -> Result<()> {
    let dims = Arc::new(BlockDims::leaf(BLOCK_SIZE, KEY_SIZE, &FIELDS)?);
    let mut block = KeyBlock::new(dims, BLOCK_SIZE as u64);
    let k = 77u32.to_be_bytes();
    for payload in 0..6u8 {
        block.add(Record::new(k, vec![vec![payload], vec![0], vec![0, 0]]))?;
    }
    let order: Vec<u8> = block
        .records()
        .iter()
        .map(|record| record.field(0).map_or(u8::MAX, |f| f[0]))
        .collect();
    assert_eq!(order, vec![5, 4, 3, 2, 1, 0]);
    assert_eq!(block.find(&k), (0, true));
    Ok(())
}

#[test]
fn scenario_c_holds_through_the_tree() -> Result<()> {
    let dir = tempdir()?;
    let tree = BPlusTree::open_or_create(dir.path().join("c.db"), KEY_SIZE, &FIELDS, BLOCK_SIZE)?;
    let k = 77u32.to_be_bytes();
    for payload in 0..6u8 {
        assert!(tree.insert(&k, &[vec![payload], vec![0], vec![0, 0]])?);
    }
    let order: Vec<u8> = tree
        .find(&k, &k)?
        .map(|record| record.map(|r| r.fields()[0][0]))
        .collect::<Result<_>>()?;
    assert_eq!(order, vec![5, 4, 3, 2, 1, 0]);
    assert_eq!(tree.get(&k)?.map(|r| r.fields()[0][0]), Some(5));
    assert_eq!(tree.size(), 6);
    Ok(())
}

#[test]
fn insert_rejects_schema_mismatch() -> Result<()> {
    let dir = tempdir()?;
    let tree = BPlusTree::open_or_create(dir.path().join("s.db"), KEY_SIZE, &FIELDS, BLOCK_SIZE)?;
    assert!(!tree.insert(&[1, 2, 3], &fields_for(1))?);
    assert!(!tree.insert(&1u32.to_be_bytes(), &[vec![1u8], vec![1]])?);
    assert!(!tree.insert(&1u32.to_be_bytes(), &[vec![1u8], vec![1], vec![1]])?);
    assert_eq!(tree.size(), 0);
    Ok(())
}

#[test]
fn construction_errors_leave_no_file() {
    let dir = tempdir().unwrap();
    let cases: [(usize, &[usize], usize); 3] = [(0, &[4], 4096), (4, &[4], 20), (4, &[0], 4096)];
    for (i, (key_size, fields, block_size)) in cases.into_iter().enumerate() {
        let path = dir.path().join(format!("bad{i}.db"));
        let err = BPlusTree::open_or_create(&path, key_size, fields, block_size).unwrap_err();
        assert!(matches!(err, LeafError::Construction(_)), "{err:?}");
        assert!(!path.exists());
    }
}
