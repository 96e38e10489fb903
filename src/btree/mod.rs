//! B-Tree Module
//!
//! Persistent B-tree mapping string keys to data pointers.
//!
//! ## Responsibilities
//! - Point lookup, insert-or-update, delete with rebalancing
//! - Keys compared by hash, then truncated key part, then full key
//! - Full keys of truncated entries resolved through a [`NameHelper`]
//! - Unordered key iteration that fails fast on modification
//!
//! ## Page Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (256 B): count (4) │ last child (4) │ padding      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Entry 0 (256 B)                                          │
//! │ ┌──────────┬───────────┬────────────┬───────────┬──────┐ │
//! │ │ Hash (4) │ Child (4) │ KeyLen (4) │ Key (220) │ Data │ │
//! │ └──────────┴───────────┴────────────┴───────────┴──────┘ │
//! ├──────────────────────────────────────────────────────────┤
//! │ Entry 1 ... Entry max-1                                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! Block 0 of the tree allocator holds [`TreeInfo`].

mod entry;
mod page;
mod names;
mod tree;
mod iter;

pub use entry::{string_hash, TreeEntry, TreeKey};
pub use page::{Page, TreeInfo};
pub use names::{LeadingNames, NameCache, NameHelper};
pub use tree::{BTree, TreeData, TreeStats};
pub use iter::KeysIter;

use crate::error::{BlobError, Result};

/// Size of one entry slot and of the page header
pub const ENTRY_SIZE: usize = 256;

/// Bytes reserved for the key part inside an entry
pub const KEY_PART_SIZE: usize = 220;

/// UTF-16 code units that fit in the key part
pub const KEY_PART_UNITS: usize = KEY_PART_SIZE / 2;

/// Entry slots in a page of `page_size` bytes.
///
/// The count must be odd and at least 3 so pages split into equal halves.
pub fn max_entries_for(page_size: usize) -> Result<usize> {
    if page_size % ENTRY_SIZE != 0 {
        return Err(BlobError::Config(format!(
            "tree page size {} is not a multiple of {}",
            page_size, ENTRY_SIZE
        )));
    }
    let slots = (page_size / ENTRY_SIZE).saturating_sub(1);
    if slots < 3 || slots % 2 != 1 {
        return Err(BlobError::Config(format!(
            "tree page of {} bytes holds {} entries; need an odd count of at least 3",
            page_size, slots
        )));
    }
    Ok(slots)
}
