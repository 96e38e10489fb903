//! Named blob store binding the tree and the data store.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alloc::{BlockId, NULL_DATA};
use crate::btree::{BTree, KeysIter, NameCache, NameHelper, TreeData, TreeStats};
use crate::config::{StoreConfig, TruncateMethod};
use crate::data::DataStore;
use crate::error::{BlobError, Result};

// =============================================================================
// Name Resolution
// =============================================================================

/// Resolves tree keys from record names and truncates with the file's method
pub(super) struct StoreNames {
    pub(super) data: Arc<DataStore>,
    pub(super) method: TruncateMethod,
}

impl NameHelper for StoreNames {
    fn full_name(&self, data: i64) -> Result<String> {
        self.data.full_name(data_block(data)?)
    }

    fn truncate(&self, units: &[u16], max_len: usize) -> Vec<u16> {
        self.method.apply(units, max_len)
    }
}

fn data_block(data: i64) -> Result<BlockId> {
    BlockId::try_from(data)
        .map_err(|_| BlobError::Serialization(format!("data pointer {} out of block range", data)))
}

/// Tree callback that inserts a new record or rewrites the existing one
struct PutRecord<'a> {
    key: &'a str,
    reader: &'a mut dyn Read,
    data: &'a DataStore,
}

impl TreeData for PutRecord<'_> {
    fn create(&mut self) -> Result<i64> {
        Ok(self.data.insert(self.key, self.reader)? as i64)
    }

    fn update(&mut self, old: i64) -> Result<i64> {
        self.data.update(data_block(old)?, self.reader)?;
        Ok(old)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Embedded store of named blobs
///
/// Closed explicitly with [`NamedStore::close`] or on drop.
pub struct NamedStore {
    tree: BTree,
    data: Arc<DataStore>,
    names: Arc<NameCache>,
    config: StoreConfig,
    closed: AtomicBool,
}

impl NamedStore {
    pub(super) fn from_parts(
        tree: BTree,
        data: Arc<DataStore>,
        names: Arc<NameCache>,
        config: StoreConfig,
    ) -> Self {
        Self {
            tree,
            data,
            names,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Parameters the file was created with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Blob Operations
    // -------------------------------------------------------------------------

    /// Store the contents of `reader` under `key`, replacing any previous blob.
    pub fn put(&self, key: &str, reader: &mut dyn Read) -> Result<()> {
        self.tree.put(
            key,
            &mut PutRecord {
                key,
                reader,
                data: &self.data,
            },
        )
    }

    pub fn put_bytes(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut reader = value;
        self.put(key, &mut reader)
    }

    /// Write the blob stored under `key` into `writer`; false when absent.
    pub fn get(&self, key: &str, writer: &mut dyn Write) -> Result<bool> {
        let pointer = self.tree.get(key)?;
        if pointer == NULL_DATA {
            return Ok(false);
        }
        self.data.select(data_block(pointer)?, writer)?;
        Ok(true)
    }

    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut value = Vec::new();
        Ok(self.get(key, &mut value)?.then_some(value))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.tree.contains(key)
    }

    /// Remove `key` and its blob. Absent keys are ignored.
    pub fn delete(&self, key: &str) -> Result<()> {
        let pointer = self.tree.remove(key)?;
        if pointer != NULL_DATA {
            self.names.forget(pointer);
            self.data.delete(data_block(pointer)?)?;
        }
        Ok(())
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> KeysIter<'_> {
        self.tree.keys()
    }

    /// Number of stored keys
    pub fn len(&self) -> u64 {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every blob into `other`.
    pub fn clone_into(&self, other: &NamedStore) -> Result<()> {
        let mut value = Vec::new();
        for key in self.keys() {
            let key = key?;
            value.clear();
            if self.get(&key, &mut value)? {
                other.put_bytes(&key, &value)?;
            }
        }
        Ok(())
    }

    /// Check the tree structure.
    pub fn verify(&self) -> Result<TreeStats> {
        self.tree.verify()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Push cached blocks and the tree info to the file.
    pub fn flush(&self) -> Result<()> {
        self.tree.flush()
    }

    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.tree.close()?;
        self.data.close()
    }
}

impl Drop for NamedStore {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Failed to close store: {}", e);
        }
    }
}

impl std::fmt::Debug for NamedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedStore")
            .field("tree", &self.tree)
            .field("config", &self.config)
            .finish()
    }
}
