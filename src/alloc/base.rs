//! Base block allocator over a byte container.

use std::sync::Arc;

use bytes::Bytes;

use crate::container::ByteContainer;
use crate::error::{BlobError, Result};

use super::{Allocator, BlockId, RandomAccessAllocator};

/// Blocks laid out back to back: block `i` starts at `i * block_size`
pub struct BlockAllocator {
    container: Arc<dyn ByteContainer>,
    block_size: usize,
}

impl BlockAllocator {
    pub fn new(container: Arc<dyn ByteContainer>, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(BlobError::Config("block size must be positive".to_string()));
        }
        Ok(Self {
            container,
            block_size,
        })
    }

    fn offset(&self, id: BlockId, count: usize) -> Result<u64> {
        if id < 0 {
            return Err(BlobError::OutOfRange {
                offset: 0,
                len: (count * self.block_size) as u64,
                size: self.container.size(),
            });
        }
        Ok(id as u64 * self.block_size as u64)
    }

    fn block_id(&self, offset: u64) -> Result<BlockId> {
        BlockId::try_from(offset / self.block_size as u64).map_err(|_| {
            BlobError::Serialization(format!("block offset {} exceeds the id range", offset))
        })
    }
}

impl Allocator for BlockAllocator {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        (self.container.size() / self.block_size as u64) as usize
    }

    fn get(&self, id: BlockId) -> Result<Bytes> {
        self.get_run(id, 1)
    }

    fn save(&self, id: BlockId, data: Bytes) -> Result<()> {
        self.save_run(id, data, 1)
    }

    fn allocate(&self) -> Result<BlockId> {
        self.allocate_run(1)
    }

    fn free(&self, _id: BlockId) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.container.close()
    }
}

impl RandomAccessAllocator for BlockAllocator {
    fn allocate_run(&self, count: usize) -> Result<BlockId> {
        let offset = self.container.append(&vec![0u8; count * self.block_size])?;
        self.block_id(offset)
    }

    fn get_run(&self, id: BlockId, count: usize) -> Result<Bytes> {
        let offset = self.offset(id, count)?;
        let mut buf = vec![0u8; count * self.block_size];
        self.container.read(offset, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn save_run(&self, id: BlockId, data: Bytes, count: usize) -> Result<()> {
        let expected = count * self.block_size;
        if data.len() != expected {
            return Err(BlobError::Serialization(format!(
                "block data of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        let offset = self.offset(id, count)?;
        self.container.write(offset, &data)
    }
}
