//! File-backed container using positional I/O.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{BlobError, Result};

use super::{check_range, ByteContainer};

/// Container over a regular file
///
/// Reads and writes at distinct offsets run concurrently; appends are
/// serialized so each one gets a unique range.
pub struct FileContainer {
    path: PathBuf,
    /// `None` once closed
    file: RwLock<Option<File>>,
    /// Logical size, published after the appended bytes are on disk
    len: AtomicU64,
    append_lock: Mutex<()>,
}

impl FileContainer {
    /// Create a new file; fails if it already exists.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self::from_file(path, file, 0))
    }

    /// Open an existing file for reading and writing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::from_file(path, file, len))
    }

    fn from_file(path: &Path, file: File, len: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            file: RwLock::new(Some(file)),
            len: AtomicU64::new(len),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteContainer for FileContainer {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(BlobError::Closed)?;
        check_range(offset, buf.len(), self.len.load(Ordering::Acquire))?;
        read_exact_at(file, buf, offset)?;
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(BlobError::Closed)?;
        check_range(offset, data.len(), self.len.load(Ordering::Acquire))?;
        write_all_at(file, data, offset)?;
        Ok(())
    }

    fn append(&self, data: &[u8]) -> Result<u64> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(BlobError::Closed)?;
        let _append = self.append_lock.lock();
        let offset = self.len.load(Ordering::Acquire);
        write_all_at(file, data, offset)?;
        self.len.store(offset + data.len() as u64, Ordering::Release);
        Ok(offset)
    }

    fn size(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.file.write();
        if let Some(file) = guard.take() {
            file.sync_all()?;
            tracing::debug!("Closed container {}", self.path.display());
        }
        Ok(())
    }
}

// =============================================================================
// Positional I/O
// =============================================================================

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            n => {
                data = &data[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}
