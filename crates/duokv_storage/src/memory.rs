//! In-memory filesystem for tests and ephemeral storage.

use crate::error::{StorageError, StorageResult};
use crate::vfs::{Vfs, VfsFile};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An in-memory filesystem.
///
/// Files live in a shared table, so two handles opened at the same path
/// observe each other's writes, matching the behavior of real files.
/// All data is lost when the `MemVfs` is dropped.
#[derive(Debug, Default, Clone)]
pub struct MemVfs {
    files: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<Vec<u8>>>>>>,
}

impl MemVfs {
    /// Creates a new, empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contents(&self, path: &Path) -> Option<Arc<Mutex<Vec<u8>>>> {
        self.files.lock().get(path).cloned()
    }
}

impl Vfs for MemVfs {
    fn open(&self, path: &Path) -> StorageResult<Box<dyn VfsFile>> {
        let data = Arc::clone(
            self.files
                .lock()
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new()))),
        );
        Ok(Box::new(MemFile {
            path: path.to_path_buf(),
            data,
        }))
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}

/// An open handle to an in-memory file.
#[derive(Debug)]
pub struct MemFile {
    path: PathBuf,
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemFile {
    /// Returns the path this handle was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VfsFile for MemFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.lock();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut bytes = self.data.lock();
        let end = offset as usize + data.len();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.data.lock();
        if new_size as usize > bytes.len() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot truncate beyond current size",
            )));
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read() {
        let vfs = MemVfs::new();
        let mut file = vfs.open(Path::new("a.bin")).unwrap();

        file.write_at(0, b"hello world").unwrap();
        assert_eq!(file.size().unwrap(), 11);
        assert_eq!(&file.read_at(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn sparse_write_zero_fills() {
        let vfs = MemVfs::new();
        let mut file = vfs.open(Path::new("a.bin")).unwrap();

        file.write_at(4, b"xy").unwrap();
        assert_eq!(file.size().unwrap(), 6);
        assert_eq!(&file.read_at(0, 6).unwrap(), &[0, 0, 0, 0, b'x', b'y']);
    }

    #[test]
    fn handles_share_contents() {
        let vfs = MemVfs::new();
        let mut a = vfs.open(Path::new("shared.bin")).unwrap();
        let b = vfs.open(Path::new("shared.bin")).unwrap();

        a.write_at(0, b"data").unwrap();
        assert_eq!(&b.read_at(0, 4).unwrap(), b"data");
    }

    #[test]
    fn remove_forgets_contents() {
        let vfs = MemVfs::new();
        let mut file = vfs.open(Path::new("a.bin")).unwrap();
        file.write_at(0, b"data").unwrap();
        drop(file);

        vfs.remove(Path::new("a.bin")).unwrap();
        assert!(!vfs.exists(Path::new("a.bin")));

        let file = vfs.open(Path::new("a.bin")).unwrap();
        assert_eq!(file.size().unwrap(), 0);
    }

    #[test]
    fn read_past_end_fails() {
        let vfs = MemVfs::new();
        let mut file = vfs.open(Path::new("a.bin")).unwrap();
        file.write_at(0, b"abc").unwrap();

        assert!(matches!(
            file.read_at(2, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn no_fd_for_memory_files() {
        let vfs = MemVfs::new();
        let file = vfs.open(Path::new("a.bin")).unwrap();
        assert!(file.raw_fd().is_none());
    }
}
