//! Property-based tests (fuzzing) for kv-repo resilience.
//!
//! Uses proptest to generate random/malformed inputs and verify the cache,
//! the index protocol, and payload decoding never panic, only return clean
//! outcomes.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use kv_repo::{ExpiringCache, InMemoryBackend, Repository};

// =============================================================================
// Strategies for generating test data
// =============================================================================

#[derive(Debug, Clone)]
enum CacheOp {
    Set(String, String),
    Get(String),
    Delete(String),
}

/// Cache operations over a deliberately tiny key space so collisions,
/// overwrites, and deletes of live keys actually happen
fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "[a-d]";
    prop_oneof![
        (key, ".{0,8}").prop_map(|(k, v)| CacheOp::Set(k, v)),
        key.prop_map(CacheOp::Get),
        key.prop_map(CacheOp::Delete),
    ]
}

#[derive(Debug, Clone)]
enum IndexOp {
    Add(usize),
    Remove(usize),
}

/// Index mutations drawn from a fixed id pool
fn index_op_strategy(pool_size: usize) -> impl Strategy<Value = IndexOp> {
    prop_oneof![
        (0..pool_size).prop_map(IndexOp::Add),
        (0..pool_size).prop_map(IndexOp::Remove),
    ]
}

/// Generate arbitrary JSON values (including shapes no entity would have)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(4, 64, 10, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
            prop::collection::hash_map(".*", inner, 0..10)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

// =============================================================================
// Payload Decoding Fuzz Tests
// =============================================================================

proptest! {
    /// Index array decoding should never panic on arbitrary bytes
    #[test]
    fn fuzz_index_decode_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..10000)) {
        // Should never panic, only return Err
        let result: Result<Vec<String>, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }

    /// Index array decoding should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_index_decode_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_vec(&json).unwrap();
        let result: Result<Vec<String>, _> = serde_json::from_slice(&serialized);
        // Either parses (a lucky string array) or fails cleanly
        let _ = result;
    }

    /// Corrupted index payloads should fail gracefully
    #[test]
    fn fuzz_corrupted_index_payload(
        members in prop::collection::vec("[a-z0-9-]{1,40}", 0..20),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let serialized = serde_json::to_vec(&members).unwrap();

        if serialized.is_empty() {
            return Ok(());
        }

        let mut corrupted = serialized.clone();
        let pos = position % corrupted.len();

        // Inject corruption
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b; // XOR to corrupt
        }

        // Should never panic
        let result: Result<Vec<String>, _> = serde_json::from_slice(&corrupted);
        let _ = result;
    }
}

// =============================================================================
// Cache Model Tests
// =============================================================================

proptest! {
    /// The cache must agree with a plain map model under any sequence of
    /// set/get/delete operations
    #[test]
    fn prop_cache_matches_map_model(ops in prop::collection::vec(cache_op_strategy(), 0..200)) {
        let cache: ExpiringCache<String> = ExpiringCache::new();
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set(key, value) => {
                    cache.set(&key, value.clone());
                    model.insert(key, value);
                }
                CacheOp::Get(key) => {
                    prop_assert_eq!(cache.get(&key), model.get(&key).cloned());
                }
                CacheOp::Delete(key) => {
                    cache.delete(&key);
                    model.remove(&key);
                }
            }
        }

        prop_assert_eq!(cache.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(cache.get(key), Some(value.clone()));
        }
    }

    /// A cached empty value must read as a hit, never as a miss
    #[test]
    fn prop_empty_values_are_not_misses(keys in prop::collection::vec("[a-z]{1,6}", 1..20)) {
        let cache: ExpiringCache<String> = ExpiringCache::new();

        for key in &keys {
            cache.set(key, String::new());
        }
        for key in &keys {
            prop_assert_eq!(cache.get(key), Some(String::new()));
        }
        prop_assert_eq!(cache.get("never-inserted"), None);
    }
}

// =============================================================================
// Identifier Round-Trip Tests
// =============================================================================

proptest! {
    /// Entity keys must round-trip: build "{repo}_{id}", strip the prefix,
    /// parse the remainder, and recover the identifier exactly
    #[test]
    fn prop_uuid_keys_round_trip(repo in "[a-z]{1,12}", bytes in any::<[u8; 16]>()) {
        let id = Uuid::from_bytes(bytes);
        let key = format!("{repo}_{id}");
        let prefix = format!("{repo}_");

        let suffix = key.strip_prefix(&prefix).unwrap();
        let parsed: Uuid = suffix.parse().unwrap();
        prop_assert_eq!(parsed, id);
    }

    /// Numeric identifiers get the same guarantee
    #[test]
    fn prop_numeric_keys_round_trip(repo in "[a-z]{1,12}", id in any::<u64>()) {
        let key = format!("{repo}_{id}");
        let prefix = format!("{repo}_");

        let suffix = key.strip_prefix(&prefix).unwrap();
        let parsed: u64 = suffix.parse().unwrap();
        prop_assert_eq!(parsed, id);
    }
}

// =============================================================================
// Index Protocol Model Tests
// =============================================================================

proptest! {
    /// Index membership must agree with an order-preserving deduplicated
    /// list model under any sequence of add/remove operations
    #[test]
    fn prop_index_matches_list_model(ops in prop::collection::vec(index_op_strategy(6), 0..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        rt.block_on(async {
            let backend = Arc::new(InMemoryBackend::new());
            let repo: Repository<Value, Uuid> = Repository::new("items", backend);

            let pool: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
            let mut model: Vec<Uuid> = Vec::new();

            for op in ops {
                match op {
                    IndexOp::Add(slot) => {
                        let id = pool[slot];
                        repo.add_to_index("members", &id).await.unwrap();
                        if !model.contains(&id) {
                            model.push(id);
                        }
                    }
                    IndexOp::Remove(slot) => {
                        let id = pool[slot];
                        repo.remove_from_index("members", &id).await.unwrap();
                        model.retain(|m| *m != id);
                    }
                }

                let stored = repo.get_index("members").await.unwrap();
                assert_eq!(stored, model);
            }
        });
    }
}
