//! Multi-block adapter: one outer block is a run of `n` inner blocks.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BlobError, Result};

use super::{Allocator, BlockId, RandomAccessAllocator};

/// Exposes `n * inner.block_size()` blocks; outer ids are the inner id of
/// the first block in each run.
pub struct MultiBlockAllocator {
    inner: Arc<dyn RandomAccessAllocator>,
    per_block: usize,
}

impl MultiBlockAllocator {
    pub fn new(inner: Arc<dyn RandomAccessAllocator>, outer_block_size: usize) -> Result<Self> {
        let inner_size = inner.block_size();
        if outer_block_size <= inner_size || outer_block_size % inner_size != 0 {
            return Err(BlobError::Config(format!(
                "outer block size {} is not a multiple of inner block size {}",
                outer_block_size, inner_size
            )));
        }
        Ok(Self {
            inner,
            per_block: outer_block_size / inner_size,
        })
    }

    /// Inner blocks per outer block
    pub fn per_block(&self) -> usize {
        self.per_block
    }
}

impl Allocator for MultiBlockAllocator {
    fn block_size(&self) -> usize {
        self.inner.block_size() * self.per_block
    }

    fn block_count(&self) -> usize {
        self.inner.block_count() / self.per_block
    }

    fn get(&self, id: BlockId) -> Result<Bytes> {
        self.inner.get_run(id, self.per_block)
    }

    fn save(&self, id: BlockId, data: Bytes) -> Result<()> {
        self.inner.save_run(id, data, self.per_block)
    }

    fn allocate(&self) -> Result<BlockId> {
        self.inner.allocate_run(self.per_block)
    }

    fn free(&self, id: BlockId) -> Result<()> {
        for offset in 0..self.per_block as BlockId {
            self.inner.free(id + offset)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
