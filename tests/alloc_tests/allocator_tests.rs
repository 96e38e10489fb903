//! Tests for block allocators
//!
//! These tests verify:
//! - Block addressing, allocation and validation in the base allocator
//! - Outer blocks built from runs of inner blocks
//! - Typed record load/store and scoped write-back

use std::sync::Arc;

use blobfile::alloc::{
    is_valid, is_valid_next, Allocator, AllocatorExt, BlockAllocator, BlockId, BlockRecord,
    MultiBlockAllocator, RandomAccessAllocator, NULL_BLOCK,
};
use blobfile::container::{ByteContainer, CountingContainer, MemoryContainer};
use blobfile::{BlobError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

// =============================================================================
// Helper Functions
// =============================================================================

fn base(block_size: usize) -> Arc<BlockAllocator> {
    Arc::new(BlockAllocator::new(Arc::new(MemoryContainer::new()), block_size).unwrap())
}

/// Small record used to exercise typed access
#[derive(Debug, Default, PartialEq)]
struct Counter {
    value: u32,
    label: u8,
}

impl BlockRecord for Counter {
    fn decode(mut buf: &[u8]) -> Result<Self> {
        Ok(Self {
            value: buf.get_u32_le(),
            label: buf.get_u8(),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(self.value);
        buf.put_u8(self.label);
        Ok(())
    }
}

/// Record that never fits in a 16-byte block
struct Oversized;

impl BlockRecord for Oversized {
    fn decode(_buf: &[u8]) -> Result<Self> {
        Ok(Oversized)
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&[7u8; 32]);
        Ok(())
    }
}

// =============================================================================
// Pointer Tests
// =============================================================================

#[test]
fn test_pointer_validity() {
    assert!(!is_valid(NULL_BLOCK));
    assert!(is_valid(0));
    assert!(!is_valid_next(0));
    assert!(!is_valid_next(NULL_BLOCK));
    assert!(is_valid_next(1));
}

// =============================================================================
// Base Allocator Tests
// =============================================================================

#[test]
fn test_base_allocate_sequential_zeroed() {
    let alloc = base(16);
    assert_eq!(alloc.block_count(), 0);

    for expected in 0..4 {
        assert_eq!(alloc.allocate().unwrap(), expected);
    }
    assert_eq!(alloc.block_count(), 4);
    assert_eq!(alloc.get(2).unwrap(), Bytes::from(vec![0u8; 16]));
}

#[test]
fn test_base_save_and_get() {
    let alloc = base(8);
    let id = alloc.allocate().unwrap();
    alloc.allocate().unwrap();

    alloc.save(id, Bytes::from_static(b"abcdefgh")).unwrap();
    assert_eq!(&alloc.get(id).unwrap()[..], b"abcdefgh");
    assert_eq!(alloc.get(1).unwrap(), Bytes::from(vec![0u8; 8]));
}

#[test]
fn test_base_rejects_wrong_length() {
    let alloc = base(8);
    let id = alloc.allocate().unwrap();
    assert!(matches!(
        alloc.save(id, Bytes::from_static(b"short")),
        Err(BlobError::Serialization(_))
    ));
}

#[test]
fn test_base_rejects_bad_ids() {
    let alloc = base(8);
    alloc.allocate().unwrap();

    assert!(matches!(alloc.get(-1), Err(BlobError::OutOfRange { .. })));
    assert!(matches!(alloc.get(5), Err(BlobError::OutOfRange { .. })));
}

#[test]
fn test_base_zero_block_size() {
    assert!(BlockAllocator::new(Arc::new(MemoryContainer::new()), 0).is_err());
}

#[test]
fn test_base_runs() {
    let alloc = base(4);
    let first = alloc.allocate_run(3).unwrap();
    assert_eq!(first, 0);
    assert_eq!(alloc.block_count(), 3);

    alloc
        .save_run(first, Bytes::from_static(b"aaaabbbbcccc"), 3)
        .unwrap();
    assert_eq!(&alloc.get(1).unwrap()[..], b"bbbb");
    assert_eq!(&alloc.get_run(1, 2).unwrap()[..], b"bbbbcccc");
}

#[test]
fn test_base_free_keeps_data() {
    let alloc = base(4);
    let id = alloc.allocate().unwrap();
    alloc.save(id, Bytes::from_static(b"keep")).unwrap();
    alloc.free(id).unwrap();
    assert_eq!(&alloc.get(id).unwrap()[..], b"keep");
}

#[test]
fn test_base_close_closes_container() {
    let container = Arc::new(MemoryContainer::new());
    let alloc = BlockAllocator::new(container.clone(), 4).unwrap();
    alloc.allocate().unwrap();
    alloc.close().unwrap();
    assert!(container.append(&[1]).is_err());
}

// =============================================================================
// Multi-Block Allocator Tests
// =============================================================================

#[test]
fn test_multi_block_layout() {
    let counter = Arc::new(CountingContainer::new(Arc::new(MemoryContainer::new())));
    let inner = Arc::new(BlockAllocator::new(counter.clone(), 16).unwrap());
    let multi = MultiBlockAllocator::new(inner.clone(), 64).unwrap();

    assert_eq!(multi.per_block(), 4);
    assert_eq!(multi.block_size(), 64);

    let a = multi.allocate().unwrap();
    let b = multi.allocate().unwrap();
    assert_eq!(a, 0);
    assert_eq!(b, 4);
    assert_eq!(multi.block_count(), 2);
    assert_eq!(inner.block_count(), 8);
    // one append per outer block
    assert_eq!(counter.appends(), 2);

    let data: Vec<u8> = (0..64).collect();
    multi.save(b, Bytes::from(data.clone())).unwrap();
    assert_eq!(&multi.get(b).unwrap()[..], &data[..]);
    assert_eq!(&inner.get(5).unwrap()[..], &data[16..32]);
}

#[test]
fn test_multi_rejects_non_multiple() {
    assert!(matches!(
        MultiBlockAllocator::new(base(32), 48),
        Err(BlobError::Config(_))
    ));
    assert!(matches!(
        MultiBlockAllocator::new(base(32), 32),
        Err(BlobError::Config(_))
    ));
}

#[test]
fn test_multi_rejects_wrong_length() {
    let multi = MultiBlockAllocator::new(base(8), 16).unwrap();
    let id = multi.allocate().unwrap();
    assert!(multi.save(id, Bytes::from(vec![0u8; 8])).is_err());
}

// =============================================================================
// Record Access Tests
// =============================================================================

#[test]
fn test_record_store_and_load() {
    let alloc = base(16);
    let id = alloc.allocate().unwrap();

    alloc.store(id, &Counter { value: 42, label: 3 }).unwrap();
    let loaded: Counter = alloc.load(id).unwrap();
    assert_eq!(loaded, Counter { value: 42, label: 3 });
}

#[test]
fn test_record_store_overflow() {
    let alloc = base(16);
    let id = alloc.allocate().unwrap();
    assert!(matches!(
        alloc.store(id, &Oversized),
        Err(BlobError::Serialization(_))
    ));
}

#[test]
fn test_modify_writes_back() {
    let alloc = base(16);
    let id = alloc.allocate().unwrap();

    let previous = alloc
        .modify(id, |c: &mut Counter| {
            let old = c.value;
            c.value = 10;
            Ok(old)
        })
        .unwrap();
    assert_eq!(previous, 0);
    assert_eq!(alloc.load::<Counter>(id).unwrap().value, 10);
}

#[test]
fn test_modify_writes_back_on_failure() {
    let alloc = base(16);
    let id = alloc.allocate().unwrap();

    let result: Result<()> = alloc.modify(id, |c: &mut Counter| {
        c.value = 99;
        Err(BlobError::NoSuchElement("gone".to_string()))
    });
    assert!(matches!(result, Err(BlobError::NoSuchElement(_))));
    assert_eq!(alloc.load::<Counter>(id).unwrap().value, 99);
}

#[test]
fn test_handle_writes_back_on_drop() {
    let alloc = base(16);
    let id: BlockId = alloc.allocate().unwrap();
    {
        let mut handle = alloc.handle::<Counter>(id).unwrap();
        assert_eq!(handle.id(), id);
        handle.label = 5;
    }
    assert_eq!(alloc.load::<Counter>(id).unwrap().label, 5);
}

#[test]
fn test_handle_commit_writes_once() {
    let counter = Arc::new(CountingContainer::new(Arc::new(MemoryContainer::new())));
    let alloc = BlockAllocator::new(counter.clone(), 16).unwrap();
    let id = alloc.allocate().unwrap();
    counter.reset_counters();

    let mut handle = alloc.handle::<Counter>(id).unwrap();
    handle.value = 7;
    handle.commit().unwrap();

    assert_eq!(counter.writes(), 1);
    assert_eq!(alloc.load::<Counter>(id).unwrap().value, 7);
}
