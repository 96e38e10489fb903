//! Byte Container Module
//!
//! Random-access byte storage underneath the block allocators.
//!
//! ## Responsibilities
//! - Positional reads and writes inside the current size
//! - Atomic append returning the start offset
//! - Meta header area in front of the block data
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ Meta header (256 B)  │ Block data (exposed from offset 0)   │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```

mod file;
mod memory;
mod counting;
mod meta;

pub use file::FileContainer;
pub use memory::MemoryContainer;
pub use counting::CountingContainer;
pub use meta::{MetaContainer, MetaHeader, FORMAT_VERSION, META_HEADER_SIZE};

use crate::error::{BlobError, Result};

/// Thread-safe random-access byte storage.
///
/// `read` and `write` never grow the container; only `append` does.
pub trait ByteContainer: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Overwrite existing bytes starting at `offset`.
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Append `data` at the end, returning the offset it was written at.
    fn append(&self, data: &[u8]) -> Result<u64>;

    /// Current size in bytes
    fn size(&self) -> u64;

    /// Flush and release the underlying resource. Idempotent.
    fn close(&self) -> Result<()>;
}

/// Reject ranges that reach past `size`.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<()> {
    let len = len as u64;
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(BlobError::OutOfRange { offset, len, size }),
    }
}
