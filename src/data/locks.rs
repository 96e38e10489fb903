//! Per-record reader/writer locks keyed by first block id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::alloc::BlockId;

/// Lock table; an entry lives only while someone holds or waits on it
#[derive(Default)]
pub struct RecordLocks {
    table: Mutex<HashMap<BlockId, Arc<RwLock<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` holding the shared lock of record `id`.
    pub fn with_read<R>(&self, id: BlockId, f: impl FnOnce() -> R) -> R {
        let lock = self.acquire(id);
        let result = {
            let _guard = lock.read();
            f()
        };
        self.release(id, lock);
        result
    }

    /// Run `f` holding the exclusive lock of record `id`.
    pub fn with_write<R>(&self, id: BlockId, f: impl FnOnce() -> R) -> R {
        let lock = self.acquire(id);
        let result = {
            let _guard = lock.write();
            f()
        };
        self.release(id, lock);
        result
    }

    /// Records with a live lock entry
    pub fn active(&self) -> usize {
        self.table.lock().len()
    }

    fn acquire(&self, id: BlockId) -> Arc<RwLock<()>> {
        self.table.lock().entry(id).or_default().clone()
    }

    fn release(&self, id: BlockId, lock: Arc<RwLock<()>>) {
        let mut table = self.table.lock();
        drop(lock);
        if table.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            table.remove(&id);
        }
    }
}
