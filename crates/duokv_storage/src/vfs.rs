//! Filesystem trait definitions.

use crate::error::StorageResult;
use std::os::unix::io::RawFd;
use std::path::Path;

/// A filesystem namespace.
///
/// A `Vfs` resolves paths to [`VfsFile`] handles. DuoKV takes the
/// filesystem interface by reference at engine open, so the same engine
/// code runs against real files, plain memory, or the fault-injecting
/// simulated backend.
///
/// # Invariants
///
/// - `open` creates the file if it does not exist and opens it read-write
/// - `remove` deletes the file; opening the path afterwards starts empty
/// - Implementations must be `Send + Sync`; handles returned by `open`
///   may be moved to another thread but are not shared
///
/// # Implementors
///
/// - [`super::FileVfs`] - OS files (created mode 0644)
/// - [`super::MemVfs`] - plain in-memory files
/// - [`super::SimVfs`] - in-memory files with rule-based fault injection
pub trait Vfs: Send + Sync {
    /// Opens the file at `path`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    fn open(&self, path: &Path) -> StorageResult<Box<dyn VfsFile>>;

    /// Removes the file at `path`.
    ///
    /// Removing a file that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove(&self, path: &Path) -> StorageResult<()>;

    /// Returns whether a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// An open file handle.
///
/// All access is positional; there is no seek cursor. Closing is dropping.
pub trait VfsFile: Send {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Flushes buffered writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// Stronger than `flush`: after this returns, the data survives
    /// process and OS termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the file to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Returns the raw file descriptor, when one exists.
    ///
    /// Real files return `Some`; memory-backed files return `None`. The
    /// engine's I/O ring submits kernel writes against descriptors and
    /// falls back to `write_at` for files without one.
    fn raw_fd(&self) -> Option<RawFd>;
}
