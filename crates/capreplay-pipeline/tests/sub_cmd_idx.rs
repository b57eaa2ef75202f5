use capreplay_pipeline::{SubCmdIdx, SubCmdIdxTrie};
use proptest::prelude::*;

/// Short indices over a tiny alphabet so prefixes actually occur.
fn arb_idx() -> impl Strategy<Value = SubCmdIdx> {
    prop::collection::vec(0u64..3, 0..5).prop_map(SubCmdIdx::from)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn contains_is_reflexive(a in arb_idx()) {
        prop_assert!(a.contains(&a));
    }

    #[test]
    fn contains_is_antisymmetric(a in arb_idx(), b in arb_idx()) {
        if a.contains(&b) && b.contains(&a) {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn contains_is_transitive(a in arb_idx(), b in arb_idx(), c in arb_idx()) {
        if a.contains(&b) && b.contains(&c) {
            prop_assert!(a.contains(&c));
        }
    }

    #[test]
    fn containers_sort_first(a in arb_idx(), b in arb_idx()) {
        if a.contains(&b) {
            prop_assert!(b <= a);
            prop_assert_eq!(b.join(&a.strip_prefix(&b).unwrap()), a);
        }
    }

    #[test]
    fn trie_finds_every_inserted_index(indices in prop::collection::vec(arb_idx(), 0..12)) {
        let mut trie = SubCmdIdxTrie::new();
        for idx in &indices {
            trie.insert(idx, idx.clone());
        }
        for idx in &indices {
            prop_assert_eq!(trie.get(idx), Some(idx));
        }

        let mut sorted = indices.clone();
        sorted.sort();
        sorted.dedup();
        let values: Vec<SubCmdIdx> = trie.values().into_iter().cloned().collect();
        prop_assert_eq!(values, sorted);
    }
}
