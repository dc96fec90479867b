//! Engine statistics and telemetry.

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine operation counters.
///
/// All counters are atomic and monotonically increasing. They exist for
/// telemetry and test assertions; none of them participate in the
/// durability contract.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Total number of successful `set` operations.
    sets: AtomicU64,
    /// Total number of `get` operations.
    gets: AtomicU64,
    /// Total number of `delete` operations (hit or miss).
    deletes: AtomicU64,
    /// Total number of explicit flushes.
    flushes: AtomicU64,
    /// Total bytes appended to the intent log.
    intent_bytes: AtomicU64,
    /// Records re-applied during recovery.
    replayed: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_set(&self, intent_bytes: u64) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.intent_bytes.fetch_add(intent_bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, intent_bytes: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.intent_bytes.fetch_add(intent_bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed(&self, count: u64) {
        self.replayed.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the total number of successful `set` operations.
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    /// Returns the total number of `get` operations.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the total number of `delete` operations.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the total number of explicit flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns the total bytes appended to the intent log.
    pub fn intent_bytes(&self) -> u64 {
        self.intent_bytes.load(Ordering::Relaxed)
    }

    /// Returns the number of records re-applied during recovery.
    pub fn replayed(&self) -> u64 {
        self.replayed.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sets: self.sets(),
            gets: self.gets(),
            deletes: self.deletes(),
            flushes: self.flushes(),
            intent_bytes: self.intent_bytes(),
            replayed: self.replayed(),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total number of successful `set` operations.
    pub sets: u64,
    /// Total number of `get` operations.
    pub gets: u64,
    /// Total number of `delete` operations.
    pub deletes: u64,
    /// Total number of explicit flushes.
    pub flushes: u64,
    /// Total bytes appended to the intent log.
    pub intent_bytes: u64,
    /// Records re-applied during recovery.
    pub replayed: u64,
}
