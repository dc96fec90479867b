//! Engine facade and recovery.

use crate::config::Config;
use crate::error::EngineResult;
use crate::index::{HashTable, TableStats};
use crate::stats::EngineStats;
use crate::wal::{data_crc, CompletionStatus, DualWal, Operation};
use duokv_storage::Vfs;
use std::path::Path;
use tracing::{debug, warn};

/// The durable key-value engine.
///
/// `Engine` composes the dual WAL and the hash index under one
/// discipline: every mutation logs an intent **before** it becomes
/// visible in the index, and logs a completion after, so recovery can
/// re-apply exactly the operations that finished.
///
/// The engine is single-threaded cooperative: one caller at a time.
/// `set`, `delete`, and `flush` may block on log I/O; `get` is
/// in-memory and never blocks.
///
/// # Opening
///
/// [`Engine::open`] takes the filesystem interface by reference, so the
/// same code runs against real files, plain memory, or the simulated
/// fault-injecting backend:
///
/// ```rust
/// use duokv_core::Engine;
/// use duokv_storage::MemVfs;
/// use std::path::Path;
///
/// let vfs = MemVfs::new();
/// let (mut engine, corruption) =
///     Engine::open(&vfs, Path::new("intent.wal"), Path::new("completion.wal")).unwrap();
/// assert_eq!(corruption, 0);
/// engine.set(b"k", b"v").unwrap();
/// ```
pub struct Engine {
    wal: DualWal,
    index: HashTable,
    stats: EngineStats,
    corruption_count: u64,
}

impl Engine {
    /// Opens the engine with default configuration.
    ///
    /// See [`Engine::open_with_config`].
    ///
    /// # Errors
    ///
    /// Returns an error if either log cannot be opened or read.
    pub fn open(
        vfs: &dyn Vfs,
        intent_path: &Path,
        completion_path: &Path,
    ) -> EngineResult<(Self, u64)> {
        Self::open_with_config(vfs, intent_path, completion_path, Config::default())
    }

    /// Opens both WAL files, replays them, and builds the index.
    ///
    /// Returns the engine together with the count of structurally invalid
    /// log records observed during replay. Corruption is reported, never
    /// raised: an engine opens against any byte soup.
    ///
    /// # Errors
    ///
    /// Returns an error if a log file cannot be opened or read, or a
    /// staging buffer cannot be allocated.
    pub fn open_with_config(
        vfs: &dyn Vfs,
        intent_path: &Path,
        completion_path: &Path,
        config: Config,
    ) -> EngineResult<(Self, u64)> {
        let mut wal = DualWal::open(vfs, intent_path, completion_path, &config)?;
        let mut index = HashTable::new(config.initial_index_capacity);
        let stats = EngineStats::new();

        // Re-apply only completed operations, directly against the index:
        // logging them again would double every record on each reopen.
        // Recovery must not hang or fail on a pathological log, so an
        // index refusal just skips the record.
        let mut replayed = 0u64;
        let corruption_count = wal.replay(|op, key, value, completed| {
            if !completed {
                return;
            }
            match op {
                Operation::Set => {
                    if index.set(key, value).is_ok() {
                        replayed += 1;
                    }
                }
                Operation::Delete => {
                    index.delete(key);
                    replayed += 1;
                }
            }
        })?;

        stats.record_replayed(replayed);

        debug!(replayed, corruption_count, "recovery complete");
        if corruption_count > 0 {
            warn!(corruption_count, "replay observed corrupt log records");
        }

        Ok((
            Self {
                wal,
                index,
                stats,
                corruption_count,
            },
            corruption_count,
        ))
    }

    /// Stores `value` under `key`.
    ///
    /// The intent is logged first; if applying to the index then fails, a
    /// completion with an error status is still attempted so replay
    /// ignores the intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent cannot be logged (the index is then
    /// untouched) or the index mutation fails.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        let intent_offset = self.wal.append_intent(Operation::Set, key, value)?;
        let crc = data_crc(key, value);

        if let Err(e) = self.index.set(key, value) {
            let _ = self
                .wal
                .append_completion(intent_offset, CompletionStatus::IoError, crc);
            return Err(e);
        }

        self.wal
            .append_completion(intent_offset, CompletionStatus::Success, crc)?;
        self.stats
            .record_set((key.len() + value.len()) as u64);
        Ok(())
    }

    /// Looks up `key` in the index. No logging.
    ///
    /// The returned view borrows the index; it is invalidated by the next
    /// mutation of that key.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.stats.record_get();
        self.index.get(key)
    }

    /// Removes `key`. Returns whether a live entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent or completion cannot be logged.
    pub fn delete(&mut self, key: &[u8]) -> EngineResult<bool> {
        let intent_offset = self.wal.append_intent(Operation::Delete, key, &[])?;
        let existed = self.index.delete(key);

        self.wal.append_completion(
            intent_offset,
            CompletionStatus::Success,
            data_crc(key, &[]),
        )?;
        self.stats.record_delete(key.len() as u64);
        Ok(existed)
    }

    /// Blocking flush of both logs. On return every accepted mutation is
    /// durable.
    ///
    /// # Errors
    ///
    /// Returns the first I/O failure from either log.
    pub fn flush(&mut self) -> EngineResult<()> {
        self.wal.flush()?;
        self.stats.record_flush();
        Ok(())
    }

    /// Returns index accounting: live entries, capacity, occupied slots.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        self.index.stats()
    }

    /// Returns the engine's operation counters.
    #[must_use]
    pub fn op_stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns true iff the count of live index slots equals its size.
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        self.index.verify_integrity()
    }

    /// Returns the corruption count observed when this engine opened.
    #[must_use]
    pub fn corruption_count(&self) -> u64 {
        self.corruption_count
    }

    /// Flushes both logs and releases the engine.
    ///
    /// Dropping an engine without calling `close` abandons any unflushed
    /// appends, which is exactly the crash the recovery path is built
    /// for.
    ///
    /// # Errors
    ///
    /// Returns the first failure from the final flush.
    pub fn close(self) -> EngineResult<()> {
        self.wal.close()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("index", &self.index.stats())
            .field("corruption_count", &self.corruption_count)
            .finish_non_exhaustive()
    }
}
