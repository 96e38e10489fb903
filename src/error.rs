//! Error types for blobfile
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BlobError
pub type Result<T> = std::result::Result<T, BlobError>;

/// Unified error type for blobfile operations
#[derive(Debug, Error)]
pub enum BlobError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("Storage fault: {0}")]
    StorageFault(#[from] std::io::Error),

    #[error("Storage fault: container is closed")]
    Closed,

    #[error("Out of range: offset {offset} + length {len} exceeds size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    // -------------------------------------------------------------------------
    // Layout Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No such element: {0}")]
    NoSuchElement(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Concurrent modification: tree changed during iteration")]
    ConcurrentModification,

    // -------------------------------------------------------------------------
    // File-level Errors
    // -------------------------------------------------------------------------
    #[error("Unsupported storage version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Cannot create storage: {0}")]
    CannotCreateStorage(String),

    #[error("Cannot load storage: {0}")]
    CannotLoadStorage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlobError {
    /// True for errors raised by the underlying container.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, BlobError::StorageFault(_) | BlobError::Closed)
    }
}
