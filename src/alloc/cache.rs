//! LRU block cache
//!
//! Decorates a random-access allocator. Blocks are kept by `(id, count)` so
//! single blocks and multi-block runs share one budget. Saves only mark the
//! cached copy dirty; the inner allocator sees them on eviction, flush,
//! reset or close.

use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{BlobError, Result};

use super::{Allocator, BlockId, RandomAccessAllocator};

type SlotKey = (BlockId, usize);

struct Slot {
    data: Bytes,
    dirty: bool,
}

struct CacheState {
    map: LruCache<SlotKey, Slot>,
    /// Sum of cached block lengths
    bytes: usize,
}

/// Write-back LRU cache over a [`RandomAccessAllocator`]
pub struct BlockCache {
    inner: Arc<dyn RandomAccessAllocator>,
    state: Mutex<CacheState>,
    max_bytes: usize,
    max_entries: usize,
}

impl BlockCache {
    pub fn new(inner: Arc<dyn RandomAccessAllocator>, max_bytes: usize) -> Self {
        let max_entries = (max_bytes / inner.block_size()).max(1);
        Self {
            inner,
            state: Mutex::new(CacheState {
                map: LruCache::unbounded(),
                bytes: 0,
            }),
            max_bytes,
            max_entries,
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every dirty entry back and drop all entries.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        state.map.clear();
        state.bytes = 0;
        Ok(())
    }

    fn flush_locked(&self, state: &mut CacheState) -> Result<()> {
        for (&(id, count), slot) in state.map.iter_mut() {
            if slot.dirty {
                self.inner.save_run(id, slot.data.clone(), count)?;
                slot.dirty = false;
            }
        }
        Ok(())
    }

    /// Evict until `incoming` more bytes fit, then insert.
    fn admit(&self, state: &mut CacheState, key: SlotKey, slot: Slot) -> Result<()> {
        let incoming = slot.data.len();
        while !state.map.is_empty()
            && (state.map.len() >= self.max_entries || state.bytes + incoming > self.max_bytes)
        {
            let Some(((id, count), evicted)) = state.map.pop_lru() else {
                break;
            };
            if evicted.dirty {
                tracing::trace!("Writing back evicted block {} ({} blocks)", id, count);
                if let Err(e) = self.inner.save_run(id, evicted.data.clone(), count) {
                    state.map.push((id, count), evicted);
                    return Err(e);
                }
            }
            state.bytes -= evicted.data.len();
        }
        state.bytes += incoming;
        state.map.push(key, slot);
        Ok(())
    }
}

impl Allocator for BlockCache {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn block_count(&self) -> usize {
        self.inner.block_count()
    }

    fn get(&self, id: BlockId) -> Result<Bytes> {
        self.get_run(id, 1)
    }

    fn save(&self, id: BlockId, data: Bytes) -> Result<()> {
        self.save_run(id, data, 1)
    }

    fn allocate(&self) -> Result<BlockId> {
        self.inner.allocate()
    }

    fn free(&self, id: BlockId) -> Result<()> {
        self.inner.free(id)
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        drop(state);
        self.inner.flush()
    }

    fn close(&self) -> Result<()> {
        self.reset()?;
        self.inner.close()
    }
}

impl RandomAccessAllocator for BlockCache {
    fn allocate_run(&self, count: usize) -> Result<BlockId> {
        self.inner.allocate_run(count)
    }

    fn get_run(&self, id: BlockId, count: usize) -> Result<Bytes> {
        let mut state = self.state.lock();
        if let Some(slot) = state.map.get(&(id, count)) {
            return Ok(slot.data.clone());
        }
        let data = self.inner.get_run(id, count)?;
        self.admit(
            &mut state,
            (id, count),
            Slot {
                data: data.clone(),
                dirty: false,
            },
        )?;
        Ok(data)
    }

    fn save_run(&self, id: BlockId, data: Bytes, count: usize) -> Result<()> {
        let expected = count * self.inner.block_size();
        if data.len() != expected {
            return Err(BlobError::Serialization(format!(
                "block data of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        let mut state = self.state.lock();
        if let Some(old) = state.map.pop(&(id, count)) {
            state.bytes -= old.data.len();
        }
        self.admit(&mut state, (id, count), Slot { data, dirty: true })
    }
}
