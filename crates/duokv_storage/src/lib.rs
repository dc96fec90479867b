//! # DuoKV Storage
//!
//! Filesystem abstraction for DuoKV.
//!
//! This crate provides the lowest-level storage abstraction for DuoKV.
//! Backends are **opaque byte stores** - they provide positional reads and
//! writes, flushing, and truncation. DuoKV owns all file format
//! interpretation; backends do not understand log records or the index.
//!
//! ## Design Principles
//!
//! - Files are addressed positionally (`read_at` / `write_at`), never by a
//!   shared cursor
//! - Real files expose their raw descriptor so the engine's I/O ring can
//!   submit writes against them directly
//! - The simulated backend injects configured error kinds against
//!   `{operation, path-glob}` rules, and exposes raw byte access so test
//!   harnesses can simulate physical media faults
//!
//! ## Available Backends
//!
//! - [`FileVfs`] - Persistent storage using OS file APIs
//! - [`MemVfs`] - In-memory storage for fast unit tests
//! - [`SimVfs`] - In-memory storage with rule-based fault injection
//!
//! ## Example
//!
//! ```rust
//! use duokv_storage::{MemVfs, Vfs};
//! use std::path::Path;
//!
//! let vfs = MemVfs::new();
//! let mut file = vfs.open(Path::new("data.bin")).unwrap();
//! file.write_at(0, b"hello world").unwrap();
//! let data = file.read_at(0, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod sim;
mod vfs;

pub use error::{StorageError, StorageResult};
pub use file::FileVfs;
pub use memory::MemVfs;
pub use sim::{FaultKind, FaultOp, FaultRule, SimVfs};
pub use vfs::{Vfs, VfsFile};
