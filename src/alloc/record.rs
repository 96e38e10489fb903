//! Typed block records and scoped modification.
//!
//! `modify` and [`BlockHandle`] make sure a loaded record is written back
//! however the caller leaves the scope.

use std::ops::{Deref, DerefMut};

use bytes::BytesMut;

use crate::error::{BlobError, Result};

use super::{Allocator, BlockId};

/// Fixed-layout structure stored in one block
pub trait BlockRecord: Sized {
    fn decode(buf: &[u8]) -> Result<Self>;

    /// Append the encoded form to `buf`; the allocator pads it to a block.
    fn encode_into(&self, buf: &mut BytesMut) -> Result<()>;
}

/// Typed helpers available on every allocator
pub trait AllocatorExt: Allocator {
    fn load<T: BlockRecord>(&self, id: BlockId) -> Result<T> {
        T::decode(&self.get(id)?)
    }

    fn store<T: BlockRecord>(&self, id: BlockId, record: &T) -> Result<()> {
        let size = self.block_size();
        let mut buf = BytesMut::with_capacity(size);
        record.encode_into(&mut buf)?;
        if buf.len() > size {
            return Err(BlobError::Serialization(format!(
                "record of {} bytes overflows block of {}",
                buf.len(),
                size
            )));
        }
        buf.resize(size, 0);
        self.save(id, buf.freeze())
    }

    /// Load, run `f`, and store the record back even when `f` fails.
    fn modify<T, R, F>(&self, id: BlockId, f: F) -> Result<R>
    where
        T: BlockRecord,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let mut record = self.load::<T>(id)?;
        let outcome = f(&mut record);
        self.store(id, &record)?;
        outcome
    }

    /// Load a record behind a guard that writes it back on drop.
    fn handle<T: BlockRecord>(&self, id: BlockId) -> Result<BlockHandle<'_, Self, T>> {
        let record = self.load::<T>(id)?;
        Ok(BlockHandle {
            alloc: self,
            id,
            record,
            committed: false,
        })
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}

/// A loaded record that is written back when dropped
///
/// `commit` writes immediately and reports the error; the drop path can only
/// log it.
pub struct BlockHandle<'a, A: Allocator + ?Sized, T: BlockRecord> {
    alloc: &'a A,
    id: BlockId,
    record: T,
    committed: bool,
}

impl<'a, A: Allocator + ?Sized, T: BlockRecord> BlockHandle<'a, A, T> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.alloc.store(self.id, &self.record)
    }
}

impl<A: Allocator + ?Sized, T: BlockRecord> Deref for BlockHandle<'_, A, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<A: Allocator + ?Sized, T: BlockRecord> DerefMut for BlockHandle<'_, A, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.record
    }
}

impl<A: Allocator + ?Sized, T: BlockRecord> Drop for BlockHandle<'_, A, T> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.alloc.store(self.id, &self.record) {
                tracing::warn!("Failed to write back block {}: {}", self.id, e);
            }
        }
    }
}
