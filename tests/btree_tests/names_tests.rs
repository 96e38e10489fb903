//! Tests for key hashing, truncation and name resolution
//!
//! These tests verify:
//! - The polynomial string hash
//! - Leading and trailing truncation
//! - Name cache hits, eviction by byte budget and invalidation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use blobfile::btree::{string_hash, LeadingNames, NameCache, NameHelper, TreeKey, KEY_PART_UNITS};
use blobfile::codec::to_utf16;
use blobfile::{BlobError, Result, TruncateMethod};

// =============================================================================
// Helper Functions
// =============================================================================

/// Resolves `data` to `name-<data>` and counts the calls
struct CountingNames {
    calls: AtomicUsize,
    method: TruncateMethod,
}

impl CountingNames {
    fn new(method: TruncateMethod) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            method,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NameHelper for CountingNames {
    fn full_name(&self, data: i64) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if data < 0 {
            return Err(BlobError::NoSuchElement(format!("{}", data)));
        }
        Ok(format!("name-{}", data))
    }

    fn truncate(&self, units: &[u16], max_len: usize) -> Vec<u16> {
        self.method.apply(units, max_len)
    }
}

fn truncate(method: TruncateMethod, s: &str, max: usize) -> String {
    String::from_utf16(&method.apply(&to_utf16(s), max)).unwrap()
}

// =============================================================================
// Hash Tests
// =============================================================================

#[test]
fn test_string_hash_values() {
    assert_eq!(string_hash(&to_utf16("")), 0);
    assert_eq!(string_hash(&to_utf16("a")), 97);
    assert_eq!(string_hash(&to_utf16("abc")), 96354);
}

#[test]
fn test_string_hash_collision() {
    assert_eq!(string_hash(&to_utf16("Aa")), string_hash(&to_utf16("BB")));
}

#[test]
fn test_string_hash_wraps() {
    // long keys overflow 32 bits without panicking
    let long = "z".repeat(1000);
    let _ = string_hash(&to_utf16(&long));
    assert_eq!(
        string_hash(&to_utf16("polygenelubricants")),
        i32::MIN
    );
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_leading_truncation() {
    assert_eq!(truncate(TruncateMethod::Leading, "test", 5), "test");
    assert_eq!(truncate(TruncateMethod::Leading, "test", 4), "test");
    assert_eq!(truncate(TruncateMethod::Leading, "test", 3), "tes");
}

#[test]
fn test_trailing_truncation() {
    assert_eq!(truncate(TruncateMethod::Trailing, "test", 5), "test");
    assert_eq!(truncate(TruncateMethod::Trailing, "test", 4), "test");
    assert_eq!(truncate(TruncateMethod::Trailing, "test", 3), "est");
}

#[test]
fn test_tree_key_uses_helper_truncation() {
    let long = format!("{}{}", "a".repeat(KEY_PART_UNITS), "tail");

    let leading = TreeKey::new(&long, &LeadingNames);
    assert!(!leading.is_whole());
    assert_eq!(leading.part.len(), KEY_PART_UNITS);
    assert_eq!(leading.part[KEY_PART_UNITS - 1], b'a' as u16);

    let trailing = TreeKey::new(&long, CountingNames::new(TruncateMethod::Trailing).as_ref());
    assert_eq!(trailing.part.len(), KEY_PART_UNITS);
    assert_eq!(trailing.part[KEY_PART_UNITS - 1], b'l' as u16);

    let short = TreeKey::new("short", &LeadingNames);
    assert!(short.is_whole());
    assert_eq!(short.hash, string_hash(&to_utf16("short")));
}

#[test]
fn test_leading_names_cannot_resolve() {
    assert!(matches!(
        LeadingNames.full_name(3),
        Err(BlobError::NoSuchElement(_))
    ));
}

// =============================================================================
// Name Cache Tests
// =============================================================================

#[test]
fn test_name_cache_hit() {
    let inner = CountingNames::new(TruncateMethod::Leading);
    let cache = NameCache::new(inner.clone(), 1024);

    assert_eq!(cache.full_name(1).unwrap(), "name-1");
    assert_eq!(cache.full_name(1).unwrap(), "name-1");
    assert_eq!(inner.calls(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.cached_bytes(), "name-1".len() * 2);
}

#[test]
fn test_name_cache_evicts_by_bytes() {
    let inner = CountingNames::new(TruncateMethod::Leading);
    // room for two six-unit names
    let cache = NameCache::new(inner.clone(), 24);

    cache.full_name(1).unwrap();
    cache.full_name(2).unwrap();
    cache.full_name(1).unwrap();
    cache.full_name(3).unwrap();
    assert_eq!(inner.calls(), 3);
    assert_eq!(cache.len(), 2);

    // 2 was least recently used
    cache.full_name(1).unwrap();
    assert_eq!(inner.calls(), 3);
    cache.full_name(2).unwrap();
    assert_eq!(inner.calls(), 4);
    assert!(cache.cached_bytes() <= 24);
}

#[test]
fn test_name_cache_forget() {
    let inner = CountingNames::new(TruncateMethod::Leading);
    let cache = NameCache::new(inner.clone(), 1024);

    cache.full_name(5).unwrap();
    cache.forget(5);
    assert!(cache.is_empty());
    assert_eq!(cache.cached_bytes(), 0);

    cache.full_name(5).unwrap();
    assert_eq!(inner.calls(), 2);

    // forgetting an unknown pointer is harmless
    cache.forget(99);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_name_cache_does_not_cache_errors() {
    let inner = CountingNames::new(TruncateMethod::Leading);
    let cache = NameCache::new(inner.clone(), 1024);

    assert!(cache.full_name(-1).is_err());
    assert!(cache.full_name(-1).is_err());
    assert_eq!(inner.calls(), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_name_cache_delegates_truncation() {
    let cache = NameCache::new(CountingNames::new(TruncateMethod::Trailing), 1024);
    assert_eq!(cache.truncate(&to_utf16("abcdef"), 2), to_utf16("ef"));
}
