//! # DuoKV Core
//!
//! Core engine for DuoKV, a small embedded key-value store whose design
//! centers on a **dual write-ahead log**: every mutation writes an intent
//! record before touching the index and a completion record after, and
//! recovery re-applies exactly the intents that completed successfully.
//!
//! This crate provides:
//! - An I/O ring for asynchronous file writes ([`IoRing`])
//! - The dual WAL with threshold flushing and corruption-tolerant replay
//!   ([`DualWal`])
//! - An open-addressed hash index with bounded probing ([`HashTable`])
//! - The engine facade composing the two ([`Engine`])
//!
//! ## Durability contract
//!
//! An operation is durable only after a successful [`Engine::flush`]. A
//! crash between append and flush may lose a suffix of operations; replay
//! never reconstructs an operation whose completion record is missing or
//! non-successful.
//!
//! ## Example
//!
//! ```rust
//! use duokv_core::Engine;
//! use duokv_storage::MemVfs;
//! use std::path::Path;
//!
//! let vfs = MemVfs::new();
//! let (mut engine, corruption) =
//!     Engine::open(&vfs, Path::new("intent.wal"), Path::new("completion.wal")).unwrap();
//! assert_eq!(corruption, 0);
//!
//! engine.set(b"key", b"value").unwrap();
//! assert_eq!(engine.get(b"key"), Some(&b"value"[..]));
//! engine.flush().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod index;
mod ioring;
mod stats;
pub mod wal;

pub use config::Config;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use index::{HashTable, TableStats};
pub use ioring::IoRing;
pub use stats::{EngineStats, StatsSnapshot};
pub use wal::{CompletionStatus, DualWal, Operation};
