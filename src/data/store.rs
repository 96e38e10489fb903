//! Chained record storage.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use crate::alloc::{is_valid_next, Allocator, AllocatorExt, BlockId, NULL_BLOCK};
use crate::error::{BlobError, Result};

use super::locks::RecordLocks;
use super::page::{DataPage, DATA_HEADER_SIZE};

/// Stores named blobs as block chains; a record is addressed by its first block
///
/// Operations on different records run concurrently. Inserts need no lock
/// since they only touch freshly allocated blocks.
pub struct DataStore {
    alloc: Arc<dyn Allocator>,
    locks: RecordLocks,
    region: usize,
}

impl DataStore {
    pub fn new(alloc: Arc<dyn Allocator>) -> Result<Self> {
        let block_size = alloc.block_size();
        if block_size <= DATA_HEADER_SIZE {
            return Err(BlobError::Config(format!(
                "data block of {} bytes leaves no room after the {} byte header",
                block_size, DATA_HEADER_SIZE
            )));
        }
        Ok(Self {
            alloc,
            locks: RecordLocks::new(),
            region: block_size - DATA_HEADER_SIZE,
        })
    }

    /// Bytes of name or payload per block
    pub fn region_size(&self) -> usize {
        self.region
    }

    // -------------------------------------------------------------------------
    // Record Operations
    // -------------------------------------------------------------------------

    /// Store `name` and the whole of `reader`, returning the first block.
    ///
    /// A failed insert deletes whatever part of the chain was written.
    pub fn insert(&self, name: &str, reader: &mut dyn Read) -> Result<BlockId> {
        let first = self.alloc.allocate()?;
        match self.write_record(first, name, reader) {
            Ok(()) => Ok(first),
            Err(e) => {
                if let Err(cleanup) = self.delete_chain(first) {
                    tracing::warn!("Failed to drop partial record at block {}: {}", first, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Replace the payload of record `first`, keeping its name.
    pub fn update(&self, first: BlockId, reader: &mut dyn Read) -> Result<()> {
        self.locks.with_write(first, || {
            let (tail_id, tail) = self.name_tail(first)?;
            self.write_payload(tail_id, tail, reader)
        })
    }

    /// Stream the payload of record `first` into `writer`.
    pub fn select(&self, first: BlockId, writer: &mut dyn Write) -> Result<()> {
        self.locks.with_read(first, || {
            let (_, mut page) = self.name_tail(first)?;
            loop {
                writer.write_all(page.payload())?;
                if !is_valid_next(page.next) {
                    break;
                }
                page = self.load_live(page.next)?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    /// Full name of record `first`.
    pub fn full_name(&self, first: BlockId) -> Result<String> {
        self.locks.with_read(first, || {
            let mut page = self.load_live(first)?;
            let whole = page.whole_name_len as usize;
            let mut name = Vec::with_capacity(whole);
            loop {
                name.extend_from_slice(page.name_part());
                if name.len() >= whole || !is_valid_next(page.next) {
                    break;
                }
                page = self.load_live(page.next)?;
            }
            if name.len() != whole {
                return Err(BlobError::Serialization(format!(
                    "record {} holds {} name bytes, expected {}",
                    first,
                    name.len(),
                    whole
                )));
            }
            String::from_utf8(name)
                .map_err(|e| BlobError::Serialization(format!("record {} name: {}", first, e)))
        })
    }

    /// Mark every block of record `first` deleted and free it.
    pub fn delete(&self, first: BlockId) -> Result<()> {
        self.locks.with_write(first, || self.delete_chain(first))
    }

    pub fn close(&self) -> Result<()> {
        self.alloc.close()
    }

    // -------------------------------------------------------------------------
    // Chain Handling
    // -------------------------------------------------------------------------

    fn write_record(&self, first: BlockId, name: &str, reader: &mut dyn Read) -> Result<()> {
        let name = name.as_bytes();
        let mut id = first;
        let mut page = DataPage::empty(self.region);
        page.whole_name_len = name.len() as u32;
        let mut written = 0;
        loop {
            let n = (name.len() - written).min(self.region);
            page.region[..n].copy_from_slice(&name[written..written + n]);
            page.name_len = n as u32;
            written += n;
            if written == name.len() {
                break;
            }
            let next = self.alloc.allocate()?;
            page.next = next;
            self.alloc.store(id, &page)?;
            id = next;
            page = DataPage::empty(self.region);
        }
        self.write_payload(id, page, reader)
    }

    /// Fill the payload from `reader` starting at the name-tail block `id`.
    ///
    /// Existing successors are reused; a block is only added once the reader
    /// has produced bytes for it, and blocks left over are deleted.
    fn write_payload(&self, mut id: BlockId, mut page: DataPage, reader: &mut dyn Read) -> Result<()> {
        let start = page.name_len as usize;
        let filled = read_full(reader, &mut page.region[start..])?;
        page.payload_len = filled as u32;
        let mut full = start + filled == self.region;

        while full {
            let mut chunk = vec![0u8; self.region];
            let filled = read_full(reader, &mut chunk)?;
            if filled == 0 {
                break;
            }
            let (next_id, mut next) = if is_valid_next(page.next) {
                (page.next, self.load_live(page.next)?)
            } else {
                let next_id = self.alloc.allocate()?;
                page.next = next_id;
                (next_id, DataPage::empty(self.region))
            };
            self.alloc.store(id, &page)?;

            next.whole_name_len = 0;
            next.name_len = 0;
            next.payload_len = filled as u32;
            next.region = chunk;
            id = next_id;
            page = next;
            full = filled == self.region;
        }

        if is_valid_next(page.next) {
            self.delete_chain(page.next)?;
            page.next = NULL_BLOCK;
        }
        self.alloc.store(id, &page)
    }

    /// Block where the name ends and the payload begins.
    fn name_tail(&self, first: BlockId) -> Result<(BlockId, DataPage)> {
        let mut id = first;
        let mut page = self.load_live(first)?;
        let whole = page.whole_name_len as usize;
        let mut seen = page.name_len as usize;
        while seen < whole {
            if !is_valid_next(page.next) {
                return Err(BlobError::Serialization(format!(
                    "record {} name chain ends after {} of {} bytes",
                    first, seen, whole
                )));
            }
            id = page.next;
            page = self.load_live(id)?;
            seen += page.name_len as usize;
        }
        Ok((id, page))
    }

    fn delete_chain(&self, first: BlockId) -> Result<()> {
        let mut id = first;
        loop {
            let mut handle = self.alloc.handle::<DataPage>(id)?;
            handle.deleted = 1;
            let next = handle.next;
            handle.commit()?;
            self.alloc.free(id)?;
            if !is_valid_next(next) {
                return Ok(());
            }
            id = next;
        }
    }

    fn load_live(&self, id: BlockId) -> Result<DataPage> {
        let page: DataPage = self.alloc.load(id)?;
        page.ensure_live(id)?;
        Ok(page)
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
