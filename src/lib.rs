//! # blobfile
//!
//! An embedded, single-file, named-blob store:
//! - arbitrary byte streams keyed by arbitrary strings
//! - one regular file with a fixed-size block layout
//! - persistent B-tree index with truncated in-page keys
//! - LRU block cache with write-back on eviction
//! - offline compaction into a fresh file
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       NamedStore                             │
//! │        put / get / contains / delete / keys / clone          │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌─────────────────────────┐     ┌─────────────────────────┐
//!   │          BTree          │     │        DataStore        │
//!   │ key -> first data block │◄────┤  chained name + payload │
//!   │   (NameCache lookups)   │     │     (record locks)      │
//!   └────────────┬────────────┘     └────────────┬────────────┘
//!                │                               │
//!                ▼                               │
//!   ┌─────────────────────────┐                  │
//!   │   MultiBlockAllocator   │                  │
//!   │  (tree page = n blocks) │                  │
//!   └────────────┬────────────┘                  │
//!                └───────────────┬───────────────┘
//!                                ▼
//!                  ┌──────────────────────────┐
//!                  │  BlockCache (LRU, dirty) │
//!                  └─────────────┬────────────┘
//!                                ▼
//!                  ┌──────────────────────────┐
//!                  │      BlockAllocator      │
//!                  └─────────────┬────────────┘
//!                                ▼
//!                  ┌──────────────────────────┐
//!                  │ MetaContainer (256 B hdr)│
//!                  └─────────────┬────────────┘
//!                                ▼
//!                  ┌──────────────────────────┐
//!                  │  FileContainer / Memory  │
//!                  └──────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod codec;

pub mod container;
pub mod alloc;
pub mod btree;
pub mod data;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlobError, Result};
pub use config::{StoreConfig, TruncateMethod};
pub use store::{NamedStore, StoreInfo};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blobfile
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
