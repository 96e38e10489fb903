//! Page and tree info records.

use bytes::{Buf, BufMut, BytesMut};

use crate::alloc::{BlockId, BlockRecord, NULL_BLOCK};
use crate::codec::ensure_remaining;
use crate::error::{BlobError, Result};

use super::entry::TreeEntry;
use super::ENTRY_SIZE;

/// One tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<TreeEntry>,
    /// Right child of the last entry
    pub last_child: BlockId,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            last_child: NULL_BLOCK,
        }
    }

    /// Child left of entry `pos`, or the last child when `pos == len`.
    pub fn child(&self, pos: usize) -> BlockId {
        match self.entries.get(pos) {
            Some(entry) => entry.child,
            None => self.last_child,
        }
    }

    pub fn set_child(&mut self, pos: usize, id: BlockId) {
        match self.entries.get_mut(pos) {
            Some(entry) => entry.child = id,
            None => self.last_child = id,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !crate::alloc::is_valid_next(self.child(0))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlockRecord for Page {
    fn decode(buf: &[u8]) -> Result<Self> {
        ensure_remaining(buf, ENTRY_SIZE, "page header")?;
        let slots = buf.len() / ENTRY_SIZE - 1;
        let mut header = buf;
        let count = header.get_u32_le() as usize;
        let last_child = header.get_i32_le();
        if count > slots {
            return Err(BlobError::Serialization(format!(
                "page claims {} entries, room for {}",
                count, slots
            )));
        }
        let entries = (0..count)
            .map(|i| {
                let start = ENTRY_SIZE * (i + 1);
                TreeEntry::decode(&buf[start..start + ENTRY_SIZE])
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            entries,
            last_child,
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(self.entries.len() as u32);
        buf.put_i32_le(self.last_child);
        buf.resize(ENTRY_SIZE, 0);
        for entry in &self.entries {
            entry.encode_into(buf)?;
        }
        Ok(())
    }
}

/// Contents of tree block 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInfo {
    pub total_count: u64,
    pub root: BlockId,
}

impl BlockRecord for TreeInfo {
    fn decode(mut buf: &[u8]) -> Result<Self> {
        ensure_remaining(buf, 12, "tree info")?;
        Ok(Self {
            total_count: buf.get_u64_le(),
            root: buf.get_i32_le(),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64_le(self.total_count);
        buf.put_i32_le(self.root);
        Ok(())
    }
}
