//! Block Allocation Module
//!
//! Fixed-size blocks carved out of a byte container.
//!
//! ## Responsibilities
//! - Whole-block get/save by id, allocation by append
//! - Runs of contiguous blocks for larger logical blocks
//! - LRU caching with write-back of dirty blocks
//! - Typed record access with scoped write-back
//!
//! ## Stack
//! ```text
//!   MultiBlockAllocator   (outer block = n inner blocks)
//!           │
//!      BlockCache          (LRU keyed by (id, n), dirty tracking)
//!           │
//!    BlockAllocator        (id * block_size offsets)
//!           │
//!     ByteContainer
//! ```

mod base;
mod cache;
mod multi;
mod record;

pub use base::BlockAllocator;
pub use cache::BlockCache;
pub use multi::MultiBlockAllocator;
pub use record::{AllocatorExt, BlockHandle, BlockRecord};

use bytes::Bytes;

use crate::error::Result;

// =============================================================================
// Pointers
// =============================================================================

/// Index of a block inside its allocator
pub type BlockId = i32;

/// Null block pointer
pub const NULL_BLOCK: BlockId = -1;

/// Null data pointer stored in tree entries
pub const NULL_DATA: i64 = -1;

/// Any non-negative id names a block.
pub fn is_valid(id: BlockId) -> bool {
    id >= 0
}

/// Chain and child links treat 0 as null too: block 0 is never a link target.
pub fn is_valid_next(id: BlockId) -> bool {
    id > 0
}

// =============================================================================
// Allocator Traits
// =============================================================================

/// Equal-size blocks addressed by id
pub trait Allocator: Send + Sync {
    fn block_size(&self) -> usize;

    fn block_count(&self) -> usize;

    /// Read a whole block.
    fn get(&self, id: BlockId) -> Result<Bytes>;

    /// Overwrite a whole block; `data` must be exactly one block long.
    fn save(&self, id: BlockId, data: Bytes) -> Result<()>;

    /// Append a zeroed block and return its id.
    fn allocate(&self) -> Result<BlockId>;

    /// Release a block. Space is only reclaimed by compaction.
    fn free(&self, id: BlockId) -> Result<()>;

    /// Push buffered blocks down without releasing anything.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()>;
}

/// Allocator that can address runs of contiguous blocks
pub trait RandomAccessAllocator: Allocator {
    /// Append `count` zeroed blocks and return the id of the first.
    fn allocate_run(&self, count: usize) -> Result<BlockId>;

    fn get_run(&self, id: BlockId, count: usize) -> Result<Bytes>;

    fn save_run(&self, id: BlockId, data: Bytes, count: usize) -> Result<()>;
}
