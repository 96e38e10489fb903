//! Tree entries and search keys.

use bytes::{Buf, BufMut, BytesMut};

use crate::alloc::{BlockId, NULL_BLOCK};
use crate::codec::{ensure_remaining, get_utf16_fixed, put_utf16_fixed, to_utf16};
use crate::error::Result;

use super::names::NameHelper;
use super::{ENTRY_SIZE, KEY_PART_UNITS};

/// Polynomial string hash over UTF-16 code units: `h = 31 * h + unit`.
///
/// Matches the hash legacy files were ordered by, so it must not change.
pub fn string_hash(units: &[u16]) -> i32 {
    units
        .iter()
        .fold(0i32, |h, &unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

// =============================================================================
// Entry
// =============================================================================

/// One key slot of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub hash: i32,
    /// Left child page
    pub child: BlockId,
    /// Full key length in UTF-16 code units
    pub key_len: u32,
    /// Significant units of the stored key part (`min(key_len, 110)`)
    pub key_part: Vec<u16>,
    pub data: i64,
}

impl TreeEntry {
    pub fn new(key: &TreeKey, data: i64) -> Self {
        Self {
            hash: key.hash,
            child: NULL_BLOCK,
            key_len: key.units.len() as u32,
            key_part: key.part.clone(),
            data,
        }
    }

    /// True when the key part is the whole key.
    pub fn holds_whole_key(&self) -> bool {
        self.key_len as usize == self.key_part.len()
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        buf.put_i32_le(self.hash);
        buf.put_i32_le(self.child);
        buf.put_u32_le(self.key_len);
        put_utf16_fixed(buf, &self.key_part, KEY_PART_UNITS)?;
        buf.put_i64_le(self.data);
        buf.resize(start + ENTRY_SIZE, 0);
        Ok(())
    }

    pub(crate) fn decode(mut buf: &[u8]) -> Result<Self> {
        ensure_remaining(buf, ENTRY_SIZE, "tree entry")?;
        let hash = buf.get_i32_le();
        let child = buf.get_i32_le();
        let key_len = buf.get_u32_le();
        let significant = (key_len as usize).min(KEY_PART_UNITS);
        let key_part = get_utf16_fixed(&mut buf, KEY_PART_UNITS, significant)?;
        let data = buf.get_i64_le();
        Ok(Self {
            hash,
            child,
            key_len,
            key_part,
            data,
        })
    }
}

// =============================================================================
// Search Key
// =============================================================================

/// A key prepared for comparison against entries
#[derive(Debug, Clone)]
pub struct TreeKey {
    pub full: String,
    pub units: Vec<u16>,
    /// Key as it would be stored in the key part
    pub part: Vec<u16>,
    pub hash: i32,
}

impl TreeKey {
    pub fn new(key: &str, names: &dyn NameHelper) -> Self {
        let units = to_utf16(key);
        let part = names.truncate(&units, KEY_PART_UNITS);
        Self {
            full: key.to_string(),
            hash: string_hash(&units),
            units,
            part,
        }
    }

    pub fn is_whole(&self) -> bool {
        self.units.len() == self.part.len()
    }
}
