//! Container decorator counting the operations that reach storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

use super::ByteContainer;

/// Counts reads, writes and appends passed through to the wrapped container
pub struct CountingContainer {
    inner: Arc<dyn ByteContainer>,
    reads: AtomicU64,
    writes: AtomicU64,
    appends: AtomicU64,
}

impl CountingContainer {
    pub fn new(inner: Arc<dyn ByteContainer>) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            appends: AtomicU64::new(0),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn appends(&self) -> u64 {
        self.appends.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.appends.store(0, Ordering::Relaxed);
    }
}

impl ByteContainer for CountingContainer {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read(offset, buf)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.inner.write(offset, data)
    }

    fn append(&self, data: &[u8]) -> Result<u64> {
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.inner.append(data)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
