//! Error types for the DuoKV engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in DuoKV engine operations.
///
/// Data-level log corruption is deliberately absent: replay counts
/// structurally invalid records and halts, it never raises.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem backend error.
    #[error("storage error: {0}")]
    Storage(#[from] duokv_storage::StorageError),

    /// Underlying async I/O or file failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Allocation failure in the index or WAL buffers.
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory {
        /// Size of the failed allocation.
        requested: usize,
    },

    /// Bounded linear probing found no usable slot, even after a resize.
    #[error("probe exhausted: no free slot within {capacity} probes")]
    ProbeExhausted {
        /// Table capacity at the time of exhaustion.
        capacity: usize,
    },

    /// Key exceeds the on-disk record limit.
    #[error("key too large: {len} bytes exceeds maximum of {max}")]
    KeyTooLarge {
        /// Actual key length.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Value exceeds the on-disk record limit.
    #[error("value too large: {len} bytes exceeds maximum of {max}")]
    ValueTooLarge {
        /// Actual value length.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// A log file outgrew the 32-bit offset space of completion records.
    #[error("log full: {path} exceeds the 4 GiB addressable by intent offsets")]
    LogFull {
        /// Path of the log that overflowed.
        path: String,
    },
}
