//! Test configuration model.
//!
//! A [`TestConfig`] fully describes a property test: given the same
//! configuration, a run is deterministic. Operation weights are
//! normalized eagerly when they are set, so samplers can assume they sum
//! to one.

use crate::invariants::Invariant;
use std::time::Duration;

/// Relative weights of the five operation types.
///
/// Weights are normalized on construction; any non-negative mix is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpMix {
    /// Weight of `SET`.
    pub set: f64,
    /// Weight of `GET`.
    pub get: f64,
    /// Weight of `DEL`.
    pub delete: f64,
    /// Weight of `FLUSH`.
    pub flush: f64,
    /// Weight of `RESTART`.
    pub restart: f64,
}

impl OpMix {
    /// Creates a mix from raw weights, normalizing them to sum to one.
    ///
    /// An all-zero mix falls back to the default distribution.
    #[must_use]
    pub fn new(set: f64, get: f64, delete: f64, flush: f64, restart: f64) -> Self {
        let raw = Self {
            set: set.max(0.0),
            get: get.max(0.0),
            delete: delete.max(0.0),
            flush: flush.max(0.0),
            restart: restart.max(0.0),
        };
        let sum = raw.set + raw.get + raw.delete + raw.flush + raw.restart;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            set: raw.set / sum,
            get: raw.get / sum,
            delete: raw.delete / sum,
            flush: raw.flush / sum,
            restart: raw.restart / sum,
        }
    }
}

impl Default for OpMix {
    fn default() -> Self {
        Self {
            set: 0.50,
            get: 0.30,
            delete: 0.15,
            flush: 0.04,
            restart: 0.01,
        }
    }
}

/// How keys are synthesized.
#[derive(Debug, Clone)]
pub enum KeyStrategy {
    /// Random lowercase keys with a length in `[min, max]`.
    UniformRandom {
        /// Minimum key length.
        min: usize,
        /// Maximum key length.
        max: usize,
    },
    /// With probability `rate`, take an existing key and flip the low bit
    /// of its first byte, stressing probe chains; otherwise a short
    /// uniform key.
    CollisionProne {
        /// Probability of deriving a near-collision from a live key.
        rate: f64,
    },
    /// `prefix` followed by an 8-digit decimal counter.
    Sequential {
        /// Key prefix.
        prefix: String,
    },
}

/// How values are synthesized.
#[derive(Debug, Clone)]
pub enum ValueStrategy {
    /// Values of exactly `len` bytes.
    Fixed {
        /// Value length.
        len: usize,
    },
    /// Lowercase values with a length in `[min, max]`.
    Variable {
        /// Minimum value length.
        min: usize,
        /// Maximum value length.
        max: usize,
    },
    /// Arbitrary binary values up to 128 bytes.
    RandomBinary,
}

/// System conditions that scale fault probabilities while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// A recovery (engine open) is in progress.
    DuringRecovery,
    /// The allocator is under pressure. Activation is left to the caller.
    UnderMemoryPressure,
    /// Operations are arriving quickly. Activation is left to the caller.
    HighOperationRate,
    /// The engine recently restarted.
    AfterRestart,
    /// A flush is in progress.
    DuringFlush,
    /// The hash table recently resized.
    HashTableResize,
}

/// A scalar applied to every fault channel while `condition` is active.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalMultiplier {
    /// Condition that arms this multiplier.
    pub condition: Condition,
    /// Factor applied to base probabilities.
    pub multiplier: f64,
    /// How many operations the condition stays active after triggering;
    /// zero means until explicitly deactivated.
    pub duration_ops: u32,
}

/// Base probabilities per fault channel, plus conditional multipliers.
#[derive(Debug, Clone, Default)]
pub struct FaultProbabilities {
    /// Probability of refusing an operation at the allocation boundary.
    pub allocator: f64,
    /// Probability of arming a one-shot filesystem error.
    pub filesystem: f64,
    /// Probability of physically damaging a WAL file.
    pub wal_corruption: f64,
    /// Probability of failing the next ring submission.
    pub ioring: f64,
    /// Multipliers applied while their condition is active.
    pub multipliers: Vec<ConditionalMultiplier>,
}

/// A sequence-reduction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkStrategy {
    /// Remove a randomly chosen operation.
    RemoveOperations,
    /// Replace a value with a shorter constant one.
    SimplifyValues,
    /// Collapse distinct keys onto a canonical representative.
    ReduceKeyDiversity,
    /// Retain a window of operations around the first violation.
    FocusAroundFailure,
    /// Keep the exact injected-fault schedule aligned while reducing.
    PreserveFailurePattern,
}

/// Shrinking settings.
#[derive(Debug, Clone)]
pub struct ShrinkConfig {
    /// Maximum number of candidate re-executions.
    pub max_attempts: u32,
    /// Strategies to cycle through.
    pub strategies: Vec<ShrinkStrategy>,
    /// Replay the recorded fault schedule during re-execution instead of
    /// sampling faults afresh.
    pub preserve_failure_conditions: bool,
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: 200,
            strategies: vec![
                ShrinkStrategy::RemoveOperations,
                ShrinkStrategy::SimplifyValues,
                ShrinkStrategy::ReduceKeyDiversity,
                ShrinkStrategy::FocusAroundFailure,
                ShrinkStrategy::PreserveFailurePattern,
            ],
            preserve_failure_conditions: true,
        }
    }
}

/// A complete, deterministic description of one property test.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Test name, used in reports and file naming.
    pub name: String,
    /// Root seed; every generated artifact derives from it.
    pub seed: u64,
    /// Number of independent sequences to run.
    pub iterations: u32,
    /// Operation-type distribution (normalized).
    pub ops: OpMix,
    /// Key synthesis strategy.
    pub keys: KeyStrategy,
    /// Value synthesis strategy.
    pub values: ValueStrategy,
    /// Inclusive range of operations per sequence.
    pub sequence_length: (usize, usize),
    /// Fault-injection probabilities.
    pub faults: FaultProbabilities,
    /// Invariants checked during execution.
    pub invariants: Vec<Invariant>,
    /// Shrinking settings.
    pub shrink: ShrinkConfig,
    /// Wall-clock budget per iteration; exceeding it aborts the
    /// iteration without failing the test.
    pub iteration_timeout: Duration,
}

impl TestConfig {
    /// Creates a configuration with default generators, the standard
    /// invariants, and no faults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            iterations: 10,
            ops: OpMix::default(),
            keys: KeyStrategy::UniformRandom { min: 4, max: 16 },
            values: ValueStrategy::Variable { min: 4, max: 32 },
            sequence_length: (50, 150),
            faults: FaultProbabilities::default(),
            invariants: crate::invariants::standard_invariants(),
            shrink: ShrinkConfig::default(),
            iteration_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the root seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the iteration count.
    #[must_use]
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the operation mix from raw weights, normalizing eagerly.
    #[must_use]
    pub fn ops(mut self, set: f64, get: f64, delete: f64, flush: f64, restart: f64) -> Self {
        self.ops = OpMix::new(set, get, delete, flush, restart);
        self
    }

    /// Sets the key strategy.
    #[must_use]
    pub fn keys(mut self, keys: KeyStrategy) -> Self {
        self.keys = keys;
        self
    }

    /// Sets the value strategy.
    #[must_use]
    pub fn values(mut self, values: ValueStrategy) -> Self {
        self.values = values;
        self
    }

    /// Sets the inclusive sequence-length range.
    #[must_use]
    pub fn sequence_length(mut self, min: usize, max: usize) -> Self {
        self.sequence_length = (min, max.max(min));
        self
    }

    /// Sets the fault probabilities.
    #[must_use]
    pub fn faults(mut self, faults: FaultProbabilities) -> Self {
        self.faults = faults;
        self
    }

    /// Replaces the invariant list.
    #[must_use]
    pub fn invariants(mut self, invariants: Vec<Invariant>) -> Self {
        self.invariants = invariants;
        self
    }

    /// Adds one invariant.
    #[must_use]
    pub fn invariant(mut self, invariant: Invariant) -> Self {
        self.invariants.push(invariant);
        self
    }

    /// Sets the shrinking configuration.
    #[must_use]
    pub fn shrink(mut self, shrink: ShrinkConfig) -> Self {
        self.shrink = shrink;
        self
    }

    /// Sets the per-iteration wall-clock budget.
    #[must_use]
    pub fn iteration_timeout(mut self, timeout: Duration) -> Self {
        self.iteration_timeout = timeout;
        self
    }

    /// Returns the multiplier configured for `condition`, if any.
    #[must_use]
    pub fn multiplier_for(&self, condition: Condition) -> Option<&ConditionalMultiplier> {
        self.faults
            .multipliers
            .iter()
            .find(|m| m.condition == condition)
    }
}
