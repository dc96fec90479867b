//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// The injectable variants (`DiskFull`, `PermissionDenied`, and friends)
/// mirror the fault kinds the simulated backend can produce, so test
/// harnesses can assert on the exact failure a rule triggered.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a file.
    #[error("read beyond end of file: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current file size.
        size: u64,
    },

    /// The device has no space left.
    #[error("disk full: {path}")]
    DiskFull {
        /// Path of the file being written.
        path: PathBuf,
    },

    /// The operation was not permitted.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// Path of the file.
        path: PathBuf,
    },

    /// The file does not exist.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The device is busy.
    #[error("device busy: {path}")]
    DeviceBusy {
        /// Path of the file.
        path: PathBuf,
    },

    /// A network-backed filesystem reported an error.
    #[error("network error: {path}")]
    NetworkError {
        /// Path of the file.
        path: PathBuf,
    },

    /// The backing bytes are corrupted.
    #[error("corrupted data: {path}")]
    CorruptedData {
        /// Path of the file.
        path: PathBuf,
    },
}
