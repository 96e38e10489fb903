//! Tests for the named store
//!
//! These tests verify:
//! - Put/get/contains/delete through the whole stack
//! - Overwrites of every size and idempotent deletes
//! - Long keys sharing their truncated form
//! - Persistence, drop-close and copying between stores
//! - Concurrent use from several threads

use std::collections::BTreeSet;
use std::path::PathBuf;

use blobfile::btree::KEY_PART_UNITS;
use blobfile::{BlobError, NamedStore, Result, StoreConfig, TruncateMethod};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Small blocks and a small cache so tests reach splits and evictions quickly.
fn small_config() -> StoreConfig {
    StoreConfig::builder()
        .data_block_size(64)
        .tree_block_size(1024)
        .cache_size(4 * 1024)
        .build()
        .unwrap()
}

fn memory_store() -> NamedStore {
    NamedStore::in_memory(&small_config()).unwrap()
}

fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.blob");
    (temp_dir, path)
}

fn key_set(store: &NamedStore) -> BTreeSet<String> {
    store.keys().collect::<Result<BTreeSet<_>>>().unwrap()
}

fn value_for(i: usize) -> Vec<u8> {
    (0..(i * 37) % 500).map(|b| (b * 7 + i) as u8).collect()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_empty_store_has_no_keys() {
    let store = memory_store();
    assert!(key_set(&store).is_empty());
    assert!(store.is_empty());
    assert_eq!(store.get_bytes("missing").unwrap(), None);
    assert!(!store.contains("missing").unwrap());
}

#[test]
fn test_put_and_get() {
    let store = memory_store();
    store.put_bytes("a", &[42, 0x00, 0xFF]).unwrap();

    assert!(store.contains("a").unwrap());
    assert_eq!(store.get_bytes("a").unwrap(), Some(vec![42, 0, 255]));
    assert_eq!(key_set(&store), BTreeSet::from(["a".to_string()]));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_get_streams_into_writer() {
    let store = memory_store();
    let value = vec![5u8; 1000];
    store.put("stream", &mut value.as_slice()).unwrap();

    let mut sink = Vec::new();
    assert!(store.get("stream", &mut sink).unwrap());
    assert_eq!(sink, value);

    let mut untouched = Vec::new();
    assert!(!store.get("other", &mut untouched).unwrap());
    assert!(untouched.is_empty());
}

#[test]
fn test_empty_key_and_value() {
    let store = memory_store();
    store.put_bytes("", b"").unwrap();
    assert!(store.contains("").unwrap());
    assert_eq!(store.get_bytes("").unwrap(), Some(Vec::new()));
}

#[test]
fn test_overwrite_with_every_size() {
    let store = memory_store();
    let sizes = [10usize, 10, 300, 5, 0, 1000, 64];
    for (round, &size) in sizes.iter().enumerate() {
        let value = vec![round as u8; size];
        store.put_bytes("k", &value).unwrap();
        assert_eq!(store.get_bytes("k").unwrap(), Some(value));
    }
    assert_eq!(store.len(), 1);
}

#[test]
fn test_delete_is_idempotent() {
    let store = memory_store();
    store.put_bytes("k", b"v").unwrap();
    store.delete("k").unwrap();
    store.delete("k").unwrap();

    assert!(!store.contains("k").unwrap());
    assert_eq!(store.get_bytes("k").unwrap(), None);
    assert!(store.is_empty());
}

#[test]
fn test_put_after_delete() {
    let store = memory_store();
    store.put_bytes("k", b"first").unwrap();
    store.delete("k").unwrap();
    store.put_bytes("k", b"second").unwrap();
    assert_eq!(store.get_bytes("k").unwrap(), Some(b"second".to_vec()));
}

#[test]
fn test_keys_are_disjoint() {
    let store = memory_store();
    for i in 0..200 {
        store.put_bytes(&format!("key{}", i), &value_for(i)).unwrap();
    }
    store.put_bytes("key50", b"changed").unwrap();
    store.delete("key51").unwrap();

    for i in 0..200 {
        let key = format!("key{}", i);
        let expected = match i {
            50 => Some(b"changed".to_vec()),
            51 => None,
            _ => Some(value_for(i)),
        };
        assert_eq!(store.get_bytes(&key).unwrap(), expected, "key {}", key);
    }
    assert_eq!(key_set(&store).len(), 199);
    store.verify().unwrap();
}

#[test]
fn test_values_survive_cache_eviction() {
    let store = memory_store();
    store.put_bytes("first", b"written before the cache churned").unwrap();
    for i in 0..300 {
        store.put_bytes(&format!("filler{}", i), &[i as u8; 100]).unwrap();
    }
    for i in 0..300 {
        store.get_bytes(&format!("filler{}", i)).unwrap();
    }
    assert_eq!(
        store.get_bytes("first").unwrap(),
        Some(b"written before the cache churned".to_vec())
    );
}

// =============================================================================
// Long Key Tests
// =============================================================================

fn long_key_pair() -> (String, String) {
    let shared = "p".repeat(KEY_PART_UNITS);
    (format!("{}-one", shared), format!("{}-two", shared))
}

fn check_long_keys(method: TruncateMethod) {
    let config = StoreConfig::builder()
        .data_block_size(64)
        .tree_block_size(1024)
        .truncate_method(method)
        .build()
        .unwrap();
    let store = NamedStore::in_memory(&config).unwrap();

    let (first, second) = long_key_pair();
    // trailing truncation needs a shared suffix to collide
    let (first, second) = match method {
        TruncateMethod::Leading => (first, second),
        TruncateMethod::Trailing => (
            format!("one-{}", "s".repeat(KEY_PART_UNITS)),
            format!("two-{}", "s".repeat(KEY_PART_UNITS)),
        ),
    };
    store.put_bytes(&first, b"1").unwrap();
    store.put_bytes(&second, b"2").unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(store.get_bytes(&first).unwrap(), Some(b"1".to_vec()));
    assert_eq!(store.get_bytes(&second).unwrap(), Some(b"2".to_vec()));
    assert_eq!(key_set(&store), BTreeSet::from([first.clone(), second.clone()]));

    store.put_bytes(&first, b"updated").unwrap();
    assert_eq!(store.len(), 2);
    store.delete(&second).unwrap();
    assert!(!store.contains(&second).unwrap());
    assert_eq!(store.get_bytes(&first).unwrap(), Some(b"updated".to_vec()));
}

#[test]
fn test_long_keys_leading() {
    check_long_keys(TruncateMethod::Leading);
}

#[test]
fn test_long_keys_trailing() {
    check_long_keys(TruncateMethod::Trailing);
}

#[test]
fn test_many_long_keys() {
    let store = memory_store();
    let keys: Vec<String> = (0..60)
        .map(|i| format!("{}/{}", "dir".repeat(50), i))
        .collect();
    for (i, key) in keys.iter().enumerate() {
        store.put_bytes(key, &value_for(i)).unwrap();
    }
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(store.get_bytes(key).unwrap(), Some(value_for(i)));
    }
    assert_eq!(key_set(&store), keys.iter().cloned().collect());
    store.verify().unwrap();
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iteration_fails_after_modification() {
    let store = memory_store();
    for i in 0..10 {
        store.put_bytes(&format!("k{}", i), b"v").unwrap();
    }
    let mut keys = store.keys();
    keys.next().unwrap().unwrap();
    store.put_bytes("new", b"v").unwrap();
    assert!(matches!(
        keys.next(),
        Some(Err(BlobError::ConcurrentModification))
    ));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_keeps_data() {
    let (_temp, path) = setup_temp_store();
    {
        let store = NamedStore::create(&path, &small_config()).unwrap();
        for i in 0..100 {
            store.put_bytes(&format!("key{}", i), &value_for(i)).unwrap();
        }
        store.put_bytes("key7", b"latest").unwrap();
        store.delete("key8").unwrap();
        store.close().unwrap();
    }

    let store = NamedStore::open(&path).unwrap();
    assert_eq!(store.config(), &small_config());
    assert_eq!(store.len(), 99);
    assert_eq!(store.get_bytes("key7").unwrap(), Some(b"latest".to_vec()));
    assert!(!store.contains("key8").unwrap());
    assert_eq!(store.get_bytes("key42").unwrap(), Some(value_for(42)));
    store.verify().unwrap();
}

#[test]
fn test_large_value_reopen() {
    let (_temp, path) = setup_temp_store();
    let value: Vec<u8> = (0..10_000_000u32).map(|i| (i % 251) as u8).collect();
    {
        let store = NamedStore::create(&path, &StoreConfig::default()).unwrap();
        store.put_bytes("k", &value).unwrap();
        store.close().unwrap();
    }

    let store = NamedStore::open(&path).unwrap();
    let mut sink = Vec::with_capacity(value.len());
    assert!(store.get("k", &mut sink).unwrap());
    assert_eq!(sink.len(), value.len());
    assert!(sink == value);
}

#[test]
fn test_drop_closes_store() {
    let (_temp, path) = setup_temp_store();
    {
        let store = NamedStore::create(&path, &small_config()).unwrap();
        store.put_bytes("dropped", b"still here").unwrap();
    }
    let store = NamedStore::open(&path).unwrap();
    assert_eq!(store.get_bytes("dropped").unwrap(), Some(b"still here".to_vec()));
}

#[test]
fn test_flush_makes_data_visible() {
    let (_temp, path) = setup_temp_store();
    let store = NamedStore::create(&path, &small_config()).unwrap();
    store.put_bytes("flushed", b"yes").unwrap();
    store.flush().unwrap();

    let info = NamedStore::read_info(&path).unwrap();
    assert_eq!(info.data_block_size, 64);
    store.close().unwrap();
}

// =============================================================================
// Copy Tests
// =============================================================================

#[test]
fn test_clone_into_copies_everything() {
    let source = memory_store();
    let target = memory_store();
    for i in 0..50 {
        source.put_bytes(&format!("key{}", i), &value_for(i)).unwrap();
    }
    target.put_bytes("key3", b"overwritten").unwrap();
    target.put_bytes("own", b"kept").unwrap();

    source.clone_into(&target).unwrap();
    assert_eq!(target.len(), 51);
    assert_eq!(target.get_bytes("key3").unwrap(), Some(value_for(3)));
    assert_eq!(target.get_bytes("own").unwrap(), Some(b"kept".to_vec()));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let store = memory_store();
    crossbeam::scope(|s| {
        for t in 0..4 {
            let store = &store;
            s.spawn(move |_| {
                for i in 0..50 {
                    let key = format!("t{}-{}", t, i);
                    store.put_bytes(&key, &value_for(i + t)).unwrap();
                    assert_eq!(store.get_bytes(&key).unwrap(), Some(value_for(i + t)));
                }
            });
        }
    })
    .unwrap();

    assert_eq!(store.len(), 200);
    assert_eq!(key_set(&store).len(), 200);
    store.verify().unwrap();
}

#[test]
fn test_concurrent_overwrites_of_one_key() {
    let store = memory_store();
    store.put_bytes("hot", b"start").unwrap();
    crossbeam::scope(|s| {
        for t in 0..4u8 {
            let store = &store;
            s.spawn(move |_| {
                for i in 0..30 {
                    store.put_bytes("hot", &vec![t; 10 + i * 10]).unwrap();
                    let value = store.get_bytes("hot").unwrap().unwrap();
                    assert!(value.iter().all(|&b| b == value[0]));
                }
            });
        }
    })
    .unwrap();
    assert_eq!(store.len(), 1);
}
