//! Data Store Module
//!
//! Blob records stored as chains of data blocks.
//!
//! ## Responsibilities
//! - Persist each record's full name followed by its payload
//! - Stream payloads in and out without buffering whole blobs
//! - Reuse, extend and cut chains on update
//! - Per-record reader/writer locking
//!
//! ## Block Format
//! ```text
//! ┌─────────┬──────────┬──────────────┬────────────┬─────────────┬─────────────────────┐
//! │ Del (1) │ Next (4) │ NameLen (4)  │ NamePart(4)│ Payload (4) │ Region              │
//! └─────────┴──────────┴──────────────┴────────────┴─────────────┴─────────────────────┘
//! ```
//! The region holds `NamePart` name bytes, then `Payload` payload bytes.
//! `NameLen` (whole name length in UTF-8 bytes) is set on the first block.
//!
//! ## Chain
//! ```text
//!  first ──► [name...] ──► [name | payload] ──► [payload...] ──► next = -1
//! ```

mod page;
mod locks;
mod store;

pub use page::{DataPage, DATA_HEADER_SIZE};
pub use locks::RecordLocks;
pub use store::DataStore;
