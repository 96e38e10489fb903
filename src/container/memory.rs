//! In-memory container, used by tests and `NamedStore::in_memory`.

use parking_lot::RwLock;

use crate::error::{BlobError, Result};

use super::{check_range, ByteContainer};

/// Growable byte vector behind a lock
pub struct MemoryContainer {
    /// `None` once closed
    bytes: RwLock<Option<Vec<u8>>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self {
            bytes: RwLock::new(Some(Vec::new())),
        }
    }
}

impl Default for MemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteContainer for MemoryContainer {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let guard = self.bytes.read();
        let bytes = guard.as_ref().ok_or(BlobError::Closed)?;
        check_range(offset, buf.len(), bytes.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut guard = self.bytes.write();
        let bytes = guard.as_mut().ok_or(BlobError::Closed)?;
        check_range(offset, data.len(), bytes.len() as u64)?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn append(&self, data: &[u8]) -> Result<u64> {
        let mut guard = self.bytes.write();
        let bytes = guard.as_mut().ok_or(BlobError::Closed)?;
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn size(&self) -> u64 {
        self.bytes.read().as_ref().map_or(0, |b| b.len() as u64)
    }

    fn close(&self) -> Result<()> {
        self.bytes.write().take();
        Ok(())
    }
}
