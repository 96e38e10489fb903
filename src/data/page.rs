//! Data block record.

use bytes::{Buf, BufMut, BytesMut};

use crate::alloc::{BlockId, BlockRecord, NULL_BLOCK};
use crate::codec::ensure_remaining;
use crate::error::{BlobError, Result};

/// Bytes in front of the region
pub const DATA_HEADER_SIZE: usize = 17;

/// One block of a record chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPage {
    pub deleted: u8,
    pub next: BlockId,
    /// Whole name length in bytes; meaningful on the first block
    pub whole_name_len: u32,
    /// Name bytes at the start of the region
    pub name_len: u32,
    /// Payload bytes following the name bytes
    pub payload_len: u32,
    pub region: Vec<u8>,
}

impl DataPage {
    /// A blank block with a region of `region_size` bytes.
    pub fn empty(region_size: usize) -> Self {
        Self {
            deleted: 0,
            next: NULL_BLOCK,
            whole_name_len: 0,
            name_len: 0,
            payload_len: 0,
            region: vec![0u8; region_size],
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted != 0
    }

    pub fn name_part(&self) -> &[u8] {
        &self.region[..self.name_len as usize]
    }

    pub fn payload(&self) -> &[u8] {
        let start = self.name_len as usize;
        &self.region[start..start + self.payload_len as usize]
    }

    /// Fail with `NoSuchElement` when the block was deleted.
    pub fn ensure_live(&self, id: BlockId) -> Result<()> {
        if self.is_deleted() {
            return Err(BlobError::NoSuchElement(format!("data block {} is deleted", id)));
        }
        Ok(())
    }
}

impl BlockRecord for DataPage {
    fn decode(buf: &[u8]) -> Result<Self> {
        ensure_remaining(buf, DATA_HEADER_SIZE, "data block header")?;
        let mut header = buf;
        let deleted = header.get_u8();
        let next = header.get_i32_le();
        let whole_name_len = header.get_u32_le();
        let name_len = header.get_u32_le();
        let payload_len = header.get_u32_le();
        let region = buf[DATA_HEADER_SIZE..].to_vec();
        if name_len as usize + payload_len as usize > region.len() {
            return Err(BlobError::Serialization(format!(
                "data block claims {} name and {} payload bytes in a {} byte region",
                name_len,
                payload_len,
                region.len()
            )));
        }
        Ok(Self {
            deleted,
            next,
            whole_name_len,
            name_len,
            payload_len,
            region,
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.deleted);
        buf.put_i32_le(self.next);
        buf.put_u32_le(self.whole_name_len);
        buf.put_u32_le(self.name_len);
        buf.put_u32_le(self.payload_len);
        buf.put_slice(&self.region);
        Ok(())
    }
}
