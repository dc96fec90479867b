//! File-backed filesystem for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::vfs::{Vfs, VfsFile};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// A filesystem backed by OS files.
///
/// Files are created mode 0644 if absent and opened read-write. Data
/// survives process restarts.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use duokv_storage::{FileVfs, Vfs};
/// use std::path::Path;
///
/// let vfs = FileVfs::new();
/// let mut file = vfs.open(Path::new("data.bin")).unwrap();
/// file.write_at(0, b"persistent data").unwrap();
/// file.sync().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct FileVfs;

impl FileVfs {
    /// Creates a new file-backed filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Vfs for FileVfs {
    fn open(&self, path: &Path) -> StorageResult<Box<dyn VfsFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Box::new(FileHandle {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
        }))
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// An open handle to an OS file.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileHandle {
    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VfsFile for FileHandle {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        let end = offset + data.len() as u64;
        if end > *size {
            *size = end;
        }

        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, *size
                ),
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.file.read().as_raw_fd())
    }
}
