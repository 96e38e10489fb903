//! Named Store Module
//!
//! The user-facing store: a B-tree index over a chained data store, both
//! living in one file.
//!
//! ## Responsibilities
//! - Key-addressed put/get/contains/delete and key iteration
//! - Resolving truncated tree keys through the data store (cached)
//! - Creating, opening and compacting store files
//!
//! ## Assembly
//! ```text
//!  FileContainer ─► MetaContainer ─► BlockAllocator ─► BlockCache ─┬─► DataStore
//!                                                                  └─► MultiBlockAllocator ─► BTree
//! ```

mod named;
mod factory;

pub use named::NamedStore;
pub use factory::StoreInfo;
