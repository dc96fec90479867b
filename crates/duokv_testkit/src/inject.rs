//! Failure injection at the operation boundary.
//!
//! Faults are decided *outside* the engine: the allocator channel skips
//! the call entirely, the filesystem and ring channels arm one-shot error
//! rules on the simulated filesystem, and the WAL-corruption channel
//! writes bits straight into the log files between operations. The engine
//! itself stays pure.

use crate::config::{Condition, FaultProbabilities, TestConfig};
use duokv_storage::{FaultKind, FaultOp, FaultRule, SimVfs};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::path::Path;

/// Seed-stream separator for injector randomness, distinct from the
/// generator stream.
const INJECTOR_STREAM: u64 = 0xF0E1_D2C3_B4A5_9687;

/// The four fault channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultChannel {
    /// Refuse the operation before it reaches the engine.
    Allocator,
    /// Arm a one-shot filesystem error on the next `*.wal` write.
    Filesystem,
    /// Physically damage a WAL file.
    WalCorruption,
    /// Fail the next ring submission.
    IoRing,
}

impl FaultChannel {
    /// All channels, in reporting order.
    pub const ALL: [FaultChannel; 4] = [
        FaultChannel::Allocator,
        FaultChannel::Filesystem,
        FaultChannel::WalCorruption,
        FaultChannel::IoRing,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Allocator => 0,
            Self::Filesystem => 1,
            Self::WalCorruption => 2,
            Self::IoRing => 3,
        }
    }

    /// Human-readable channel name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Allocator => "allocator",
            Self::Filesystem => "filesystem",
            Self::WalCorruption => "wal_corruption",
            Self::IoRing => "ioring",
        }
    }
}

/// A concrete injected effect, recorded so a shrunk sequence can replay
/// the exact fault schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultAction {
    /// Skip the operation (allocator refusal).
    SkipOp,
    /// One-shot disk-full on `*.wal` writes.
    FsDiskFull,
    /// One-shot I/O error on `*.wal` writes (next ring submission).
    RingError,
    /// Flip one bit of a log file.
    WalBitFlip {
        /// Target the intent log (vs. the completion log).
        intent_log: bool,
        /// Byte offset, reduced modulo the file size at apply time.
        offset: u64,
        /// Bit index within the byte.
        bit: u8,
    },
    /// Drop trailing bytes of a log file.
    WalTruncate {
        /// Target the intent log.
        intent_log: bool,
        /// Number of trailing bytes to drop.
        drop_bytes: u64,
    },
    /// Overwrite a span of a log file with a fill byte.
    WalRandomFill {
        /// Target the intent log.
        intent_log: bool,
        /// Byte offset, reduced modulo the file size at apply time.
        offset: u64,
        /// Span length.
        len: u8,
        /// Fill byte.
        fill: u8,
    },
}

/// Per-channel roll/hit accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionCounts {
    pub(crate) rolls: [u64; 4],
    pub(crate) hits: [u64; 4],
}

impl InjectionCounts {
    /// Number of probability rolls for `channel`.
    #[must_use]
    pub fn rolls(&self, channel: FaultChannel) -> u64 {
        self.rolls[channel.index()]
    }

    /// Number of injections for `channel`.
    #[must_use]
    pub fn hits(&self, channel: FaultChannel) -> u64 {
        self.hits[channel.index()]
    }

    /// Achieved injection ratio for `channel`.
    #[must_use]
    pub fn achieved_ratio(&self, channel: FaultChannel) -> f64 {
        let rolls = self.rolls(channel);
        if rolls == 0 {
            return 0.0;
        }
        self.hits(channel) as f64 / rolls as f64
    }

}

/// Mutable injector state for one sequence execution.
#[derive(Debug)]
pub struct InjectorState {
    probs: FaultProbabilities,
    rng: ChaCha8Rng,
    /// Active conditions and how many more operations they persist;
    /// `None` persists until explicit deactivation.
    active: HashMap<Condition, Option<u32>>,
    /// Roll/hit counters for the whole sequence.
    pub counts: InjectionCounts,
}

impl InjectorState {
    /// Creates the injector for `(config, iteration)` with its own
    /// deterministic random stream.
    #[must_use]
    pub fn new(config: &TestConfig, iteration: u32) -> Self {
        Self {
            probs: config.faults.clone(),
            rng: ChaCha8Rng::seed_from_u64(
                config.seed ^ INJECTOR_STREAM ^ u64::from(iteration).rotate_left(17),
            ),
            active: HashMap::new(),
            counts: InjectionCounts::default(),
        }
    }

    /// Activates `condition` for `duration_ops` operations (`None` =
    /// until deactivated).
    pub fn activate(&mut self, condition: Condition, duration_ops: Option<u32>) {
        self.active.insert(condition, duration_ops);
    }

    /// Deactivates `condition`.
    pub fn deactivate(&mut self, condition: Condition) {
        self.active.remove(&condition);
    }

    /// Returns whether `condition` is currently active.
    #[must_use]
    pub fn is_active(&self, condition: Condition) -> bool {
        self.active.contains_key(&condition)
    }

    /// Advances one operation: counts down bounded conditions.
    pub fn tick(&mut self) {
        self.active.retain(|_, remaining| match remaining {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        });
    }

    /// The effective probability of `channel` right now:
    /// `min(1.0, base * active multipliers)`.
    #[must_use]
    pub fn effective_probability(&self, channel: FaultChannel) -> f64 {
        let base = match channel {
            FaultChannel::Allocator => self.probs.allocator,
            FaultChannel::Filesystem => self.probs.filesystem,
            FaultChannel::WalCorruption => self.probs.wal_corruption,
            FaultChannel::IoRing => self.probs.ioring,
        };

        let mut effective = base;
        for m in &self.probs.multipliers {
            if self.active.contains_key(&m.condition) {
                effective *= m.multiplier;
            }
        }
        effective.min(1.0)
    }

    /// Rolls `channel` against its effective probability.
    pub fn roll(&mut self, channel: FaultChannel) -> bool {
        let p = self.effective_probability(channel);
        self.counts.rolls[channel.index()] += 1;
        let hit = p > 0.0 && self.rng.gen::<f64>() < p;
        if hit {
            self.counts.hits[channel.index()] += 1;
        }
        hit
    }

    /// Rolls every channel for one operation boundary and materializes
    /// the concrete actions.
    pub(crate) fn sample_actions(&mut self) -> Vec<FaultAction> {
        let mut actions = Vec::new();

        if self.roll(FaultChannel::Allocator) {
            actions.push(FaultAction::SkipOp);
        }
        if self.roll(FaultChannel::Filesystem) {
            actions.push(FaultAction::FsDiskFull);
        }
        if self.roll(FaultChannel::WalCorruption) {
            actions.push(self.sample_corruption());
        }
        if self.roll(FaultChannel::IoRing) {
            actions.push(FaultAction::RingError);
        }

        actions
    }

    fn sample_corruption(&mut self) -> FaultAction {
        let intent_log = self.rng.gen_bool(0.5);
        match self.rng.gen_range(0..3) {
            0 => FaultAction::WalBitFlip {
                intent_log,
                offset: self.rng.gen(),
                bit: self.rng.gen_range(0..8),
            },
            1 => FaultAction::WalTruncate {
                intent_log,
                drop_bytes: self.rng.gen_range(1..64),
            },
            _ => FaultAction::WalRandomFill {
                intent_log,
                offset: self.rng.gen(),
                len: self.rng.gen_range(1..32),
                fill: self.rng.gen(),
            },
        }
    }
}

/// Applies a materialized fault action to the simulated filesystem.
/// `SkipOp` is handled by the executor, not here.
pub(crate) fn apply_action(
    action: &FaultAction,
    vfs: &SimVfs,
    intent_path: &Path,
    completion_path: &Path,
) {
    let log_path = |intent: bool| if intent { intent_path } else { completion_path };

    match action {
        FaultAction::SkipOp => {}
        FaultAction::FsDiskFull => {
            vfs.inject(FaultRule::once(FaultOp::Write, "*.wal", FaultKind::DiskFull));
        }
        FaultAction::RingError => {
            vfs.inject(FaultRule::once(FaultOp::Write, "*.wal", FaultKind::IoError));
        }
        FaultAction::WalBitFlip {
            intent_log,
            offset,
            bit,
        } => {
            let path = log_path(*intent_log);
            if let Some(size) = file_size(vfs, path) {
                vfs.flip_bit(path, offset % size, *bit);
            }
        }
        FaultAction::WalTruncate {
            intent_log,
            drop_bytes,
        } => {
            let path = log_path(*intent_log);
            if let Some(size) = file_size(vfs, path) {
                vfs.truncate_raw(path, size.saturating_sub(*drop_bytes));
            }
        }
        FaultAction::WalRandomFill {
            intent_log,
            offset,
            len,
            fill,
        } => {
            let path = log_path(*intent_log);
            if let Some(size) = file_size(vfs, path) {
                let start = offset % size;
                let span = u64::from(*len).min(size - start) as usize;
                vfs.corrupt_at(path, start, &vec![*fill; span]);
            }
        }
    }
}

fn file_size(vfs: &SimVfs, path: &Path) -> Option<u64> {
    let len = vfs.raw_bytes(path)?.len() as u64;
    if len == 0 {
        None
    } else {
        Some(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConditionalMultiplier, TestConfig};

    fn config_with_faults(allocator: f64) -> TestConfig {
        TestConfig::new("inject").seed(11).faults(FaultProbabilities {
            allocator,
            ..FaultProbabilities::default()
        })
    }

    #[test]
    fn zero_probability_never_fires() {
        let config = config_with_faults(0.0);
        let mut injector = InjectorState::new(&config, 0);
        for _ in 0..1000 {
            assert!(!injector.roll(FaultChannel::Allocator));
        }
        assert_eq!(injector.counts.hits(FaultChannel::Allocator), 0);
        assert_eq!(injector.counts.rolls(FaultChannel::Allocator), 1000);
    }

    #[test]
    fn certain_probability_always_fires() {
        let config = config_with_faults(1.0);
        let mut injector = InjectorState::new(&config, 0);
        for _ in 0..100 {
            assert!(injector.roll(FaultChannel::Allocator));
        }
        assert_eq!(injector.counts.achieved_ratio(FaultChannel::Allocator), 1.0);
    }

    #[test]
    fn achieved_ratio_tracks_target() {
        let config = config_with_faults(0.1);
        let mut injector = InjectorState::new(&config, 0);
        for _ in 0..20_000 {
            injector.roll(FaultChannel::Allocator);
        }
        let achieved = injector.counts.achieved_ratio(FaultChannel::Allocator);
        assert!(
            (achieved - 0.1).abs() < 0.01,
            "achieved {achieved} too far from 0.1"
        );
    }

    #[test]
    fn multipliers_compound_and_clamp() {
        let mut config = config_with_faults(0.4);
        config.faults.multipliers = vec![
            ConditionalMultiplier {
                condition: Condition::DuringRecovery,
                multiplier: 2.0,
                duration_ops: 0,
            },
            ConditionalMultiplier {
                condition: Condition::DuringFlush,
                multiplier: 3.0,
                duration_ops: 0,
            },
        ];
        let mut injector = InjectorState::new(&config, 0);

        assert!((injector.effective_probability(FaultChannel::Allocator) - 0.4).abs() < 1e-9);

        injector.activate(Condition::DuringRecovery, None);
        assert!((injector.effective_probability(FaultChannel::Allocator) - 0.8).abs() < 1e-9);

        // 0.4 * 2.0 * 3.0 clamps to 1.0.
        injector.activate(Condition::DuringFlush, None);
        assert!((injector.effective_probability(FaultChannel::Allocator) - 1.0).abs() < 1e-9);

        injector.deactivate(Condition::DuringRecovery);
        injector.deactivate(Condition::DuringFlush);
        assert!((injector.effective_probability(FaultChannel::Allocator) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn bounded_conditions_expire() {
        let config = config_with_faults(0.0);
        let mut injector = InjectorState::new(&config, 0);

        injector.activate(Condition::AfterRestart, Some(2));
        assert!(injector.is_active(Condition::AfterRestart));
        injector.tick();
        assert!(injector.is_active(Condition::AfterRestart));
        injector.tick();
        assert!(injector.is_active(Condition::AfterRestart));
        injector.tick();
        assert!(!injector.is_active(Condition::AfterRestart));
    }

    #[test]
    fn injector_stream_is_deterministic() {
        let config = config_with_faults(0.3);
        let mut a = InjectorState::new(&config, 5);
        let mut b = InjectorState::new(&config, 5);

        let rolls_a: Vec<bool> = (0..100).map(|_| a.roll(FaultChannel::Allocator)).collect();
        let rolls_b: Vec<bool> = (0..100).map(|_| b.roll(FaultChannel::Allocator)).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn corruption_actions_respect_file_bounds() {
        use duokv_storage::Vfs;
        let vfs = SimVfs::new();
        let intent = Path::new("intent.wal");
        let completion = Path::new("completion.wal");

        // Empty files: every corruption action is a no-op.
        apply_action(
            &FaultAction::WalBitFlip {
                intent_log: true,
                offset: 1234,
                bit: 3,
            },
            &vfs,
            intent,
            completion,
        );
        assert!(vfs.raw_bytes(intent).is_none());

        let mut file = vfs.open(intent).unwrap();
        file.write_at(0, &[0u8; 32]).unwrap();

        apply_action(
            &FaultAction::WalRandomFill {
                intent_log: true,
                offset: u64::MAX - 3,
                len: 200,
                fill: 0xEE,
            },
            &vfs,
            intent,
            completion,
        );
        // Still 32 bytes: the fill clamps to the file end.
        assert_eq!(vfs.raw_bytes(intent).unwrap().len(), 32);
    }
}
