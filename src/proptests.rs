use crate::config::{Addressing, BaseSearch, Config, SiblingOrder, Variant};
use crate::trie::DaTrie;

use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
enum Op<V> {
    Insert(Vec<u8>, V),
    Remove(Vec<u8>),
    Get(Vec<u8>),
    Rebuild,
}

fn configs() -> Vec<Config> {
    let mut out = Vec::new();
    for variant in [Variant::MpTrie, Variant::Patricia] {
        for addressing in [Addressing::ParentCheck, Addressing::LetterCheck] {
            for order in [SiblingOrder::Sorted, SiblingOrder::Insertion] {
                out.push(
                    Config::default()
                        .with_variant(variant)
                        .with_addressing(addressing)
                        .with_sibling_order(order),
                );
            }
        }
    }
    out.push(Config::default().with_base_search(BaseSearch::EmptyScan));
    out.push(Config::patricia().with_max_trials(3));
    out
}

fn config_strategy() -> impl Strategy<Value = Config> {
    prop::sample::select(configs())
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // 0x00 is the terminator and never part of a key. A narrow alphabet mixed
    // in keeps shared prefixes (and therefore splits and forks) frequent.
    let byte = prop_oneof![3 => b'a'..=b'd', 1 => 1u8..=255];
    prop::collection::vec(byte, 0..=24)
}

fn ops_strategy_u64() -> impl Strategy<Value = Vec<Op<u64>>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        24 => key.clone().prop_map(Op::Get),
        1 => Just(Op::Rebuild),
    ];
    prop::collection::vec(op, 0..=600)
}

fn ops_strategy_set() -> impl Strategy<Value = Vec<Op<()>>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => key.clone().prop_map(|k| Op::Insert(k, ())),
        40 => key.clone().prop_map(Op::Remove),
        10 => key.clone().prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=600)
}

fn assert_same_contents<V: crate::Value + PartialEq + std::fmt::Debug>(
    t: &DaTrie<V>,
    m: &BTreeMap<Vec<u8>, V>,
) {
    let mut got: Vec<(Vec<u8>, V)> = t.iter().collect();
    if t.config().sibling_order != SiblingOrder::Sorted {
        got.sort_by(|a, b| a.0.cmp(&b.0));
    }
    let expected: Vec<(Vec<u8>, V)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(got, expected);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_u64(config in config_strategy(), ops in ops_strategy_u64()) {
        let mut t: DaTrie<u64> = DaTrie::with_config(config);
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let old_t = t.insert(&key, value).unwrap();
                    let old_m = m.insert(key, value);
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Remove(key) => {
                    let old_t = t.remove(&key);
                    let old_m = m.remove(key.as_slice());
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Get(key) => {
                    let got_t = t.get(&key);
                    let got_m = m.get(key.as_slice()).copied();
                    prop_assert_eq!(got_t, got_m);
                }
                Op::Rebuild => {
                    t.rebuild().unwrap();
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        if let Err(e) = t.validate() {
            return Err(TestCaseError::fail(e));
        }
        assert_same_contents(&t, &m);
    }

    #[test]
    fn prop_equivalence_set(config in config_strategy(), ops in ops_strategy_set()) {
        let mut t: DaTrie<()> = DaTrie::with_config(config);
        let mut m: BTreeMap<Vec<u8>, ()> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let old_t = t.insert(&key, value).unwrap();
                    let old_m = m.insert(key, ());
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Remove(key) => {
                    let old_t = t.remove(&key);
                    let old_m = m.remove(key.as_slice());
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.contains_key(&key), m.contains_key(key.as_slice()));
                }
                Op::Rebuild => {}
            }
        }

        if let Err(e) = t.validate() {
            return Err(TestCaseError::fail(e));
        }
        assert_same_contents(&t, &m);
    }

    #[test]
    fn prop_prefix_searches(config in config_strategy(),
                            keys in prop::collection::vec(key_strategy(), 0..200),
                            query in key_strategy()) {
        let mut t: DaTrie<u32> = DaTrie::with_config(config);
        let mut m: BTreeMap<Vec<u8>, u32> = BTreeMap::new();
        for (i, k) in keys.into_iter().enumerate() {
            t.insert(&k, i as u32).unwrap();
            m.insert(k, i as u32);
        }

        let expected: Vec<(usize, u32)> = (0..=query.len())
            .filter_map(|n| m.get(&query[..n]).map(|v| (n, *v)))
            .collect();
        prop_assert_eq!(t.common_prefix_search(&query), expected);

        let mut got: Vec<(Vec<u8>, u32)> = t.predictive_search(&query).collect();
        got.sort();
        let expected: Vec<(Vec<u8>, u32)> = m
            .range(query.clone()..)
            .take_while(|(k, _)| k.starts_with(&query))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        prop_assert_eq!(got, expected);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_set() -> Vec<Vec<u8>> {
    vec![
        b"a".to_vec(),
        b"b".to_vec(),
        b"".to_vec(),
        b"aa".to_vec(),
        b"ab".to_vec(),
        b"bab".to_vec(),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    for config in configs() {
        let mut shape: Option<Vec<(Vec<u8>, u64)>> = None;
        for_each_permutation(&small_set(), |perm| {
            let mut t: DaTrie<u64> = DaTrie::with_config(config.clone());
            let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

            for k in perm {
                let v = k.len() as u64;
                assert_eq!(t.insert(&k, v).unwrap(), m.insert(k, v));
            }

            t.validate().unwrap();
            assert_same_contents(&t, &m);

            // Order independence: same contents whatever the insertion order.
            let mut items: Vec<(Vec<u8>, u64)> = t.iter().collect();
            items.sort();
            match &shape {
                Some(s) => assert_eq!(&items, s),
                None => shape = Some(items),
            }
        });
    }
}

#[test]
fn exhaustive_remove_order_small_set() {
    for config in configs() {
        // Insert in a fixed order, then remove in all permutations.
        let mut base_trie: DaTrie<u64> = DaTrie::with_config(config.clone());
        let mut base_map: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        for (i, k) in small_set().iter().enumerate() {
            let v = i as u64;
            assert_eq!(base_trie.insert(k, v).unwrap(), base_map.insert(k.clone(), v));
        }

        for_each_permutation(&small_set(), |perm| {
            let mut t = base_trie.clone();
            let mut m = base_map.clone();

            for k in perm {
                assert_eq!(t.remove(&k), m.remove(k.as_slice()));
                assert_eq!(t.len(), m.len());
                t.validate().unwrap();
            }
            assert!(t.is_empty());
            assert_eq!(t.stats().num_occupied, 1);
        });
    }
}
