use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tierlite::local::{InsertOutcome, LocalTier, LocalTierConfig, OverflowPolicy};

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u8),
    Get(u8),
    Delete(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..32, any::<u8>()).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..32).prop_map(Op::Get),
        (0u8..32).prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(proptest::test_runner::Config {
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::WithSource("proptest-regressions"))),
        cases: 32,
        .. proptest::test_runner::Config::default()
    })]
    #[test]
    fn prop_single_thread_matches_model_and_respects_bound(
        max_size in 1usize..16,
        ops in proptest::collection::vec(op(), 0..200),
    ) {
        let tier = LocalTier::new(LocalTierConfig { max_size, ..Default::default() });
        let mut model: HashMap<String, Vec<u8>> = HashMap::new();
        let ttl = Duration::from_secs(600);
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let key = format!("k{k}");
                    match tier.put(&key, vec![v], ttl) {
                        InsertOutcome::Rejected => {
                            prop_assert!(!model.contains_key(&key));
                            prop_assert_eq!(model.len(), max_size);
                        }
                        _ => { model.insert(key, vec![v]); }
                    }
                }
                Op::Get(k) => {
                    let key = format!("k{k}");
                    prop_assert_eq!(tier.get(&key), model.get(&key).cloned());
                }
                Op::Delete(k) => {
                    let key = format!("k{k}");
                    prop_assert_eq!(tier.delete(&key), model.remove(&key).is_some());
                }
            }
            prop_assert!(tier.size() <= max_size);
            prop_assert_eq!(tier.size(), model.len());
        }
    }

    #[test]
    fn prop_evict_lru_never_rejects(max_size in 1usize..8, keys in proptest::collection::vec(0u8..64, 1..100)) {
        let tier = LocalTier::new(LocalTierConfig {
            max_size,
            overflow: OverflowPolicy::EvictLru,
            ..Default::default()
        });
        for k in keys {
            let key = format!("k{k}");
            prop_assert_ne!(tier.put(&key, vec![k], Duration::from_secs(600)), InsertOutcome::Rejected);
            prop_assert!(tier.contains_key(&key));
            prop_assert!(tier.size() <= max_size);
        }
    }
}
