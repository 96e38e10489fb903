//! Creating, opening, compacting and describing store files.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::alloc::{Allocator, BlockAllocator, BlockCache, MultiBlockAllocator};
use crate::btree::{BTree, NameCache};
use crate::config::{StoreConfig, TruncateMethod, KB, MB, NAME_CACHE_BYTES};
use crate::container::{ByteContainer, FileContainer, MemoryContainer, MetaContainer, MetaHeader};
use crate::data::DataStore;
use crate::error::{BlobError, Result};

use super::named::{NamedStore, StoreNames};

// =============================================================================
// Store Info
// =============================================================================

/// Parameters read from a store file's header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub version: u32,
    pub data_block_size: usize,
    pub tree_block_size: usize,
    pub cache_size: usize,
    pub truncate_method: TruncateMethod,
}

impl From<&MetaHeader> for StoreInfo {
    fn from(header: &MetaHeader) -> Self {
        Self {
            version: header.version,
            data_block_size: header.data_block_size as usize,
            tree_block_size: header.tree_block_size as usize,
            cache_size: header.cache_size as usize,
            truncate_method: header.truncate_method,
        }
    }
}

impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BTree based storage")?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(
            f,
            "Block size: Data: {} K, Tree: {} K",
            self.data_block_size / KB,
            self.tree_block_size / KB
        )?;
        writeln!(f, "Cache: {} M", self.cache_size / MB)?;
        write!(f, "Truncate method: {}", self.truncate_method)
    }
}

// =============================================================================
// Factory
// =============================================================================

impl NamedStore {
    /// Create a new store file; fails when `path` already exists.
    pub fn create(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        let file = FileContainer::create(path).map_err(|e| {
            BlobError::CannotCreateStorage(format!("{}: {}", path.display(), e))
        })?;
        tracing::debug!("Creating store {} with {:?}", path.display(), config);
        Self::initialize(Arc::new(file), config)
    }

    /// Open an existing store file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BlobError::CannotLoadStorage(format!(
                "{}: no such file",
                path.display()
            )));
        }
        let file = FileContainer::open(path)
            .map_err(|e| BlobError::CannotLoadStorage(format!("{}: {}", path.display(), e)))?;
        let meta = MetaContainer::new(Arc::new(file))?;
        let header = meta.header().ok_or_else(|| {
            BlobError::CannotLoadStorage(format!("{}: empty file", path.display()))
        })?;
        tracing::debug!("Opening store {}", path.display());
        Self::assemble(Arc::new(meta), &header)
    }

    /// Open `path`, creating it with `config` when missing.
    pub fn open_or_create(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, config)
        }
    }

    /// A store living entirely in memory.
    pub fn in_memory(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Self::initialize(Arc::new(MemoryContainer::new()), config)
    }

    fn initialize(container: Arc<dyn ByteContainer>, config: &StoreConfig) -> Result<Self> {
        let meta = MetaContainer::new(container)?;
        let header = MetaHeader::from_config(config);
        meta.write_header(&header)?;
        Self::assemble(Arc::new(meta), &header)
    }

    /// Stack allocators over the header-stripped container and open the tree.
    fn assemble(container: Arc<dyn ByteContainer>, header: &MetaHeader) -> Result<Self> {
        let config = header.to_config();
        config.validate()?;
        let data_size = config.data_block_size;
        let tree_size = config.tree_block_size();

        let base = Arc::new(BlockAllocator::new(container, data_size)?);
        let cache = Arc::new(BlockCache::new(base, config.cache_size));
        let tree_alloc: Arc<dyn Allocator> = if tree_size > data_size {
            Arc::new(MultiBlockAllocator::new(cache.clone(), tree_size)?)
        } else {
            cache.clone()
        };

        let data = Arc::new(DataStore::new(cache)?);
        let names = Arc::new(NameCache::new(
            Arc::new(StoreNames {
                data: data.clone(),
                method: config.truncate_method,
            }),
            NAME_CACHE_BYTES,
        ));
        let tree = BTree::new(tree_alloc, names.clone())?;
        Ok(NamedStore::from_parts(tree, data, names, config))
    }

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------

    /// Rewrite the store at `path` into a fresh file holding only live data.
    ///
    /// The existing file is renamed to a backup while the compacted copy takes
    /// its place; the backup is restored if that rename fails.
    pub fn compact(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let load_err = |e: BlobError| BlobError::CannotLoadStorage(format!("{}: {}", path.display(), e));

        let source = Self::open(path).map_err(load_err)?;
        let temp = sibling(path, "_compact")?;
        let copied = Self::create(&temp, source.config()).and_then(|target| {
            source.clone_into(&target)?;
            target.close()
        });
        let closed = source.close();
        if let Err(e) = copied.and(closed) {
            if let Err(cleanup) = fs::remove_file(&temp) {
                tracing::warn!("Failed to remove temporary file {}: {}", temp.display(), cleanup);
            }
            return Err(load_err(e));
        }

        let backup = sibling(path, "_backup")?;
        fs::rename(path, &backup).map_err(|e| load_err(e.into()))?;
        if let Err(e) = fs::rename(&temp, path) {
            fs::rename(&backup, path).map_err(|e| load_err(e.into()))?;
            return Err(load_err(e.into()));
        }
        fs::remove_file(&backup).map_err(|e| load_err(e.into()))?;
        tracing::debug!("Compacted store {}", path.display());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Info
    // -------------------------------------------------------------------------

    /// Read the parameters of the store at `path` without opening the tree.
    pub fn read_info(path: impl AsRef<Path>) -> Result<StoreInfo> {
        let path = path.as_ref();
        let file = FileContainer::open(path)
            .map_err(|e| BlobError::CannotLoadStorage(format!("{}: {}", path.display(), e)))?;
        let meta = MetaContainer::new(Arc::new(file))?;
        let info = meta.header().as_ref().map(StoreInfo::from).ok_or_else(|| {
            BlobError::CannotLoadStorage(format!("{}: empty file", path.display()))
        });
        meta.close()?;
        info
    }

    pub fn print_info(path: impl AsRef<Path>, out: &mut dyn Write) -> Result<()> {
        let info = Self::read_info(path)?;
        writeln!(out, "{}", info)?;
        Ok(())
    }
}

/// First unused `<file><suffix><n>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| BlobError::CannotLoadStorage(format!("{}: not a file path", path.display())))?
        .to_string_lossy()
        .into_owned();
    (0u32..)
        .map(|n| path.with_file_name(format!("{}{}{}", name, suffix, n)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| BlobError::CannotLoadStorage("no free temporary name".to_string()))
}
