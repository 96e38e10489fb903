//! Low-level helpers shared by the block codecs.
//!
//! All multi-byte integers are little-endian. Keys inside tree pages are kept
//! as fixed-width UTF-16LE fields padded with zeros.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{BlobError, Result};

/// Fail with a serialization error unless `buf` has at least `need` bytes left.
pub fn ensure_remaining(buf: &[u8], need: usize, what: &str) -> Result<()> {
    if buf.remaining() < need {
        return Err(BlobError::Serialization(format!(
            "{}: need {} bytes, have {}",
            what,
            need,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Write `units` as UTF-16LE into a field of exactly `width` code units.
pub fn put_utf16_fixed(buf: &mut BytesMut, units: &[u16], width: usize) -> Result<()> {
    if units.len() > width {
        return Err(BlobError::Serialization(format!(
            "key part of {} units does not fit {} units",
            units.len(),
            width
        )));
    }
    for unit in units {
        buf.put_u16_le(*unit);
    }
    buf.put_bytes(0, (width - units.len()) * 2);
    Ok(())
}

/// Read a fixed `width`-unit UTF-16LE field keeping the first `significant` units.
pub fn get_utf16_fixed(buf: &mut &[u8], width: usize, significant: usize) -> Result<Vec<u16>> {
    ensure_remaining(buf, width * 2, "key part")?;
    if significant > width {
        return Err(BlobError::Serialization(format!(
            "key part claims {} units, field holds {}",
            significant, width
        )));
    }
    let mut units = Vec::with_capacity(significant);
    for _ in 0..significant {
        units.push(buf.get_u16_le());
    }
    buf.advance((width - significant) * 2);
    Ok(units)
}

pub fn to_utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

pub fn from_utf16(units: &[u16]) -> Result<String> {
    String::from_utf16(units)
        .map_err(|e| BlobError::Serialization(format!("invalid UTF-16 key: {}", e)))
}
