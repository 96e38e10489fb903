//! Full-name resolution for truncated keys.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::TruncateMethod;
use crate::error::{BlobError, Result};

/// Supplies full keys for entries whose key part is truncated
pub trait NameHelper: Send + Sync {
    /// Full key stored alongside the data at `data`.
    fn full_name(&self, data: i64) -> Result<String>;

    /// Shorten `units` to at most `max_len` code units.
    fn truncate(&self, units: &[u16], max_len: usize) -> Vec<u16> {
        TruncateMethod::Leading.apply(units, max_len)
    }
}

/// Helper for trees without name storage: leading truncation, no lookups.
pub struct LeadingNames;

impl NameHelper for LeadingNames {
    fn full_name(&self, data: i64) -> Result<String> {
        Err(BlobError::NoSuchElement(format!(
            "no name storage to resolve the key of data {}",
            data
        )))
    }
}

// =============================================================================
// Name Cache
// =============================================================================

struct NameCacheState {
    map: LruCache<i64, Arc<str>>,
    bytes: usize,
}

/// LRU cache of resolved names in front of another helper
///
/// A name costs two bytes per UTF-16 code unit against the budget.
pub struct NameCache {
    inner: Arc<dyn NameHelper>,
    state: Mutex<NameCacheState>,
    max_bytes: usize,
}

impl NameCache {
    pub fn new(inner: Arc<dyn NameHelper>, max_bytes: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(NameCacheState {
                map: LruCache::unbounded(),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Drop the cached name for `data`.
    pub fn forget(&self, data: i64) {
        let mut state = self.state.lock();
        if let Some(name) = state.map.pop(&data) {
            state.bytes -= name_cost(&name);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently charged against the budget
    pub fn cached_bytes(&self) -> usize {
        self.state.lock().bytes
    }

    fn remember(&self, data: i64, name: Arc<str>) {
        let cost = name_cost(&name);
        let mut state = self.state.lock();
        if let Some(old) = state.map.pop(&data) {
            state.bytes -= name_cost(&old);
        }
        while !state.map.is_empty() && state.bytes + cost > self.max_bytes {
            if let Some((_, evicted)) = state.map.pop_lru() {
                state.bytes -= name_cost(&evicted);
            }
        }
        state.bytes += cost;
        state.map.push(data, name);
    }
}

fn name_cost(name: &str) -> usize {
    name.encode_utf16().count() * 2
}

impl NameHelper for NameCache {
    fn full_name(&self, data: i64) -> Result<String> {
        if let Some(name) = self.state.lock().map.get(&data) {
            return Ok(name.to_string());
        }
        let name: Arc<str> = Arc::from(self.inner.full_name(data)?);
        self.remember(data, name.clone());
        Ok(name.to_string())
    }

    fn truncate(&self, units: &[u16], max_len: usize) -> Vec<u16> {
        self.inner.truncate(units, max_len)
    }
}
