//! Configuration for blobfile
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::str::FromStr;

use crate::error::{BlobError, Result};

// =============================================================================
// Constants
// =============================================================================

pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Default data block size (in KiB)
pub const DEFAULT_DATA_BLOCK_KB: usize = 4;

/// Default cache budget (in MiB)
pub const DEFAULT_CACHE_MB: usize = 64;

/// Tree pages are the smallest multiple of the data block at least this large
pub const MIN_TREE_BLOCK: usize = 256 * KB;

/// Budget of the long-name cache (in bytes)
pub const NAME_CACHE_BYTES: usize = MB;

// =============================================================================
// Truncation Method
// =============================================================================

/// How a key longer than the in-page key field is shortened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncateMethod {
    /// Keep the first code units
    #[default]
    Leading,
    /// Keep the last code units
    Trailing,
}

impl TruncateMethod {
    /// On-disk code (1 = leading, 2 = trailing)
    pub fn code(self) -> u32 {
        match self {
            TruncateMethod::Leading => 1,
            TruncateMethod::Trailing => 2,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(TruncateMethod::Leading),
            2 => Ok(TruncateMethod::Trailing),
            other => Err(BlobError::Serialization(format!(
                "unknown truncate method code {}",
                other
            ))),
        }
    }

    /// Shorten a UTF-16 key to at most `max_len` code units.
    pub fn apply(self, units: &[u16], max_len: usize) -> Vec<u16> {
        if units.len() <= max_len {
            return units.to_vec();
        }
        match self {
            TruncateMethod::Leading => units[..max_len].to_vec(),
            TruncateMethod::Trailing => units[units.len() - max_len..].to_vec(),
        }
    }
}

impl fmt::Display for TruncateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TruncateMethod::Leading => write!(f, "leading"),
            TruncateMethod::Trailing => write!(f, "trailing"),
        }
    }
}

impl FromStr for TruncateMethod {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "leading" => Ok(TruncateMethod::Leading),
            "trailing" => Ok(TruncateMethod::Trailing),
            other => Err(BlobError::InvalidSyntax(format!(
                "Unknown truncate method `{}`. Supported are `leading` and `trailing`",
                other
            ))),
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Parameters a store file is created with.
///
/// Once written into the meta header these are fixed for the life of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------
    /// Size of one data block (in bytes)
    pub data_block_size: usize,

    /// Explicit tree page size (in bytes); derived from the data block when unset
    pub tree_block_size: Option<usize>,

    /// How long keys are shortened inside tree pages
    pub truncate_method: TruncateMethod,

    // -------------------------------------------------------------------------
    // Runtime
    // -------------------------------------------------------------------------
    /// Block cache budget (in bytes)
    pub cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_block_size: DEFAULT_DATA_BLOCK_KB * KB,
            tree_block_size: None,
            truncate_method: TruncateMethod::Leading,
            cache_size: DEFAULT_CACHE_MB * MB,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Tree page size: explicit override or the smallest multiple of the
    /// data block size that is at least [`MIN_TREE_BLOCK`].
    pub fn tree_block_size(&self) -> usize {
        match self.tree_block_size {
            Some(size) => size,
            None => {
                let blocks = (MIN_TREE_BLOCK + self.data_block_size - 1) / self.data_block_size;
                blocks.max(1) * self.data_block_size
            }
        }
    }

    /// Check the parameters can describe a valid file.
    pub fn validate(&self) -> Result<()> {
        if self.data_block_size <= crate::data::DATA_HEADER_SIZE {
            return Err(BlobError::Config(format!(
                "data block size {} leaves no room for data",
                self.data_block_size
            )));
        }
        if self.data_block_size > u32::MAX as usize || self.cache_size > u32::MAX as usize {
            return Err(BlobError::Config(
                "block and cache sizes must fit in 32 bits".to_string(),
            ));
        }
        let tree = self.tree_block_size();
        if tree % self.data_block_size != 0 {
            return Err(BlobError::Config(format!(
                "tree block size {} is not a multiple of data block size {}",
                tree, self.data_block_size
            )));
        }
        if tree > u32::MAX as usize {
            return Err(BlobError::Config(format!("tree block size {} too large", tree)));
        }
        crate::btree::max_entries_for(tree)?;
        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: StoreConfig,
}

impl ConfigBuilder {
    /// Set the data block size (in KiB)
    pub fn data_block_kb(mut self, kb: usize) -> Self {
        self.config.data_block_size = kb * KB;
        self
    }

    /// Set the data block size (in bytes)
    pub fn data_block_size(mut self, size: usize) -> Self {
        self.config.data_block_size = size;
        self
    }

    /// Override the derived tree page size (in bytes)
    pub fn tree_block_size(mut self, size: usize) -> Self {
        self.config.tree_block_size = Some(size);
        self
    }

    /// Set the cache budget (in MiB)
    pub fn cache_mb(mut self, mb: usize) -> Self {
        self.config.cache_size = mb * MB;
        self
    }

    /// Set the cache budget (in bytes)
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    /// Set the truncation method for long keys
    pub fn truncate_method(mut self, method: TruncateMethod) -> Self {
        self.config.truncate_method = method;
        self
    }

    pub fn build(self) -> Result<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
