//! Meta header wrapper
//!
//! Reserves the first 256 bytes of the wrapped container for the file
//! parameters and exposes everything after them starting at offset 0.
//!
//! ## Header Layout
//! ```text
//! ┌─────────────┬─────────────┬─────────────┬─────────────┬─────────────┬─────────┬─────────┐
//! │ Version (4) │ TreeBlk (4) │ DataBlk (4) │ Truncate (4)│ Cache (4)   │ CRC (4) │ Padding │
//! └─────────────┴─────────────┴─────────────┴─────────────┴─────────────┴─────────┴─────────┘
//! ```
//! The CRC covers the first 20 bytes.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::RwLock;

use crate::config::{StoreConfig, TruncateMethod};
use crate::error::{BlobError, Result};

use super::ByteContainer;

/// Size of the reserved header area
pub const META_HEADER_SIZE: usize = 256;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 4;

const CHECKSUMMED_LEN: usize = 20;

// =============================================================================
// Header
// =============================================================================

/// File parameters stored in the header area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaHeader {
    pub version: u32,
    pub tree_block_size: u32,
    pub data_block_size: u32,
    pub truncate_method: TruncateMethod,
    pub cache_size: u32,
}

impl MetaHeader {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            version: FORMAT_VERSION,
            tree_block_size: config.tree_block_size() as u32,
            data_block_size: config.data_block_size as u32,
            truncate_method: config.truncate_method,
            cache_size: config.cache_size as u32,
        }
    }

    pub fn to_config(&self) -> StoreConfig {
        StoreConfig {
            data_block_size: self.data_block_size as usize,
            tree_block_size: Some(self.tree_block_size as usize),
            truncate_method: self.truncate_method,
            cache_size: self.cache_size as usize,
        }
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(META_HEADER_SIZE);
        buf.put_u32_le(self.version);
        buf.put_u32_le(self.tree_block_size);
        buf.put_u32_le(self.data_block_size);
        buf.put_u32_le(self.truncate_method.code());
        buf.put_u32_le(self.cache_size);
        let crc = crc32fast::hash(&buf[..CHECKSUMMED_LEN]);
        buf.put_u32_le(crc);
        buf.resize(META_HEADER_SIZE, 0);
        buf
    }

    /// Decode a header, checking the version before the checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < META_HEADER_SIZE {
            return Err(BlobError::CannotLoadStorage(format!(
                "meta header truncated to {} bytes",
                bytes.len()
            )));
        }
        let mut buf = bytes;
        let version = buf.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(BlobError::VersionMismatch {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let tree_block_size = buf.get_u32_le();
        let data_block_size = buf.get_u32_le();
        let truncate_code = buf.get_u32_le();
        let cache_size = buf.get_u32_le();
        let stored_crc = buf.get_u32_le();

        let actual_crc = crc32fast::hash(&bytes[..CHECKSUMMED_LEN]);
        if stored_crc != actual_crc {
            return Err(BlobError::CannotLoadStorage(format!(
                "meta header checksum mismatch: stored {:08x}, computed {:08x}",
                stored_crc, actual_crc
            )));
        }

        Ok(Self {
            version,
            tree_block_size,
            data_block_size,
            truncate_method: TruncateMethod::from_code(truncate_code)?,
            cache_size,
        })
    }
}

// =============================================================================
// Wrapper
// =============================================================================

/// Container view that hides the header area
pub struct MetaContainer {
    inner: Arc<dyn ByteContainer>,
    header: RwLock<Option<MetaHeader>>,
}

impl MetaContainer {
    /// Wrap `inner`, decoding the header when one is present.
    pub fn new(inner: Arc<dyn ByteContainer>) -> Result<Self> {
        let size = inner.size();
        let header = if size == 0 {
            None
        } else if size < META_HEADER_SIZE as u64 {
            return Err(BlobError::CannotLoadStorage(format!(
                "file of {} bytes is too short for a meta header",
                size
            )));
        } else {
            let mut bytes = vec![0u8; META_HEADER_SIZE];
            inner.read(0, &mut bytes)?;
            Some(MetaHeader::decode(&bytes)?)
        };
        Ok(Self {
            inner,
            header: RwLock::new(header),
        })
    }

    pub fn header(&self) -> Option<MetaHeader> {
        self.header.read().clone()
    }

    /// Persist `header`: appended on an empty container, rewritten in place otherwise.
    pub fn write_header(&self, header: &MetaHeader) -> Result<()> {
        let mut slot = self.header.write();
        let bytes = header.encode();
        if self.inner.size() == 0 {
            self.inner.append(&bytes)?;
        } else {
            self.inner.write(0, &bytes)?;
        }
        *slot = Some(header.clone());
        Ok(())
    }

    fn ensure_header(&self) -> Result<()> {
        if self.header.read().is_none() {
            return Err(BlobError::Serialization(
                "meta header has not been written".to_string(),
            ));
        }
        Ok(())
    }
}

impl ByteContainer for MetaContainer {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read(offset + META_HEADER_SIZE as u64, buf)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.inner.write(offset + META_HEADER_SIZE as u64, data)
    }

    fn append(&self, data: &[u8]) -> Result<u64> {
        self.ensure_header()?;
        let offset = self.inner.append(data)?;
        Ok(offset - META_HEADER_SIZE as u64)
    }

    fn size(&self) -> u64 {
        self.inner.size().saturating_sub(META_HEADER_SIZE as u64)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
