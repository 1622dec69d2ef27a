#![allow(missing_docs)]

use std::collections::BTreeMap;

use leafdb::{BPlusTree, CachePolicy, InternalLayout, TreeOptions};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Insert { key: u16, value: u32 },
    Get { key: u16 },
    Range { left: u16, right: u16 },
}

fn arb_layout() -> impl Strategy<Value = InternalLayout> {
    prop_oneof![
        Just(InternalLayout::EqualPointers),
        Just(InternalLayout::Classic)
    ]
}

fn arb_cache() -> impl Strategy<Value = CachePolicy> {
    prop_oneof![
        (1usize..8).prop_map(|capacity| CachePolicy::Lru { capacity }),
        (1usize..8).prop_map(|capacity| CachePolicy::Lfu { capacity }),
        Just(CachePolicy::None),
    ]
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => (0u16..400, any::<u32>()).prop_map(|(key, value)| Operation::Insert { key, value }),
        2 => (0u16..400).prop_map(|key| Operation::Get { key }),
        1 => (0u16..400, 0u16..400).prop_map(|(left, right)| Operation::Range { left, right }),
    ]
}

fn open(layout: InternalLayout, cache: CachePolicy) -> (tempfile::TempDir, BPlusTree) {
    let dir = tempfile::tempdir().unwrap();
    let options = TreeOptions {
        internal_layout: layout,
        cache,
        ..TreeOptions::new(2, &[4], 96)
    };
    let tree = BPlusTree::open_with_options(dir.path().join("prop.db"), options).unwrap();
    (dir, tree)
}

fn scan(tree: &BPlusTree, left: u16, right: u16) -> Vec<(u16, u32)> {
    tree.find(&left.to_be_bytes(), &right.to_be_bytes())
        .unwrap()
        .map(|record| {
            let record = record.unwrap();
            let key = u16::from_be_bytes([record.key()[0], record.key()[1]]);
            let field = record.field(0).unwrap();
            (key, u32::from_be_bytes([field[0], field[1], field[2], field[3]]))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_tree_agrees_with_multimap(
        layout in arb_layout(),
        cache in arb_cache(),
        ops in prop::collection::vec(arb_operation(), 1..400),
    ) {
        let (_dir, tree) = open(layout, cache);
        // newest value first for every key
        let mut reference: BTreeMap<u16, Vec<u32>> = BTreeMap::new();

        for op in ops {
            match op {
                Operation::Insert { key, value } => {
                    prop_assert!(tree.insert(&key.to_be_bytes(), &[value.to_be_bytes()]).unwrap());
                    reference.entry(key).or_default().insert(0, value);
                }
                Operation::Get { key } => {
                    let got = tree.get(&key.to_be_bytes()).unwrap();
                    prop_assert_eq!(got.is_some(), reference.contains_key(&key));
                    prop_assert_eq!(tree.contains(&key.to_be_bytes()).unwrap(), reference.contains_key(&key));
                }
                Operation::Range { left, right } => {
                    let got = scan(&tree, left, right);
                    let mut got_sorted = got.clone();
                    got_sorted.sort_by_key(|&(key, _)| key);
                    prop_assert_eq!(&got, &got_sorted);
                    let expected_len: usize = if left <= right {
                        reference.range(left..=right).map(|(_, values)| values.len()).sum()
                    } else {
                        0
                    };
                    prop_assert_eq!(got.len(), expected_len);
                }
            }
        }

        let total: usize = reference.values().map(Vec::len).sum();
        prop_assert_eq!(tree.size(), total as u64);
        let everything = scan(&tree, 0, u16::MAX);
        prop_assert_eq!(everything.len(), total);
        for (key, values) in &reference {
            let mut got: Vec<u32> = everything
                .iter()
                .filter(|(k, _)| k == key)
                .map(|&(_, v)| v)
                .collect();
            let mut want = values.clone();
            got.sort_unstable();
            want.sort_unstable();
            prop_assert_eq!(got, want);
        }
        let report = tree.verify().unwrap();
        prop_assert!(report.success, "{:?}", report.findings);
    }

    #[test]
    fn prop_find_is_stable_across_calls(
        keys in prop::collection::vec(0u16..200, 1..200),
        left in 0u16..200,
        width in 0u16..100,
    ) {
        let (_dir, tree) = open(InternalLayout::EqualPointers, CachePolicy::Lru { capacity: 4 });
        for (i, key) in keys.iter().enumerate() {
            tree.insert(&key.to_be_bytes(), &[(i as u32).to_be_bytes()]).unwrap();
        }
        let right = left.saturating_add(width);
        let first = scan(&tree, left, right);
        let second = scan(&tree, left, right);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_short_duplicate_runs_keep_newest_first(
        key in 0u16..50,
        copies in 1usize..6,
    ) {
        let (_dir, tree) = open(InternalLayout::Classic, CachePolicy::None);
        for copy in 0..copies {
            tree.insert(&key.to_be_bytes(), &[(copy as u32).to_be_bytes()]).unwrap();
        }
        let values: Vec<u32> = scan(&tree, key, key).into_iter().map(|(_, v)| v).collect();
        let expected: Vec<u32> = (0..copies as u32).rev().collect();
        prop_assert_eq!(values, expected);
    }
}
