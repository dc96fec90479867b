//! Aggregate run statistics.

use crate::inject::{FaultChannel, InjectionCounts};
use std::fmt;
use std::time::Duration;

/// Everything a test run collects.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Operations generated across all sequences.
    pub ops_generated: u64,
    /// Operations actually dispatched (injection can skip some).
    pub ops_executed: u64,
    /// Sequences run.
    pub sequences_run: u64,
    /// Engine restarts executed.
    pub restarts: u64,
    /// Flushes executed.
    pub flushes: u64,
    /// Operations that returned an error (normal under fault injection).
    pub op_errors: u64,
    /// Iterations aborted by the wall-clock budget.
    pub timeouts: u64,
    /// Per-channel injection accounting.
    pub injections: InjectionCounts,
    /// Per-channel target probabilities, for achieved-vs-target
    /// reporting.
    pub targets: [f64; 4],
    /// Invariant violations observed (all severities).
    pub invariant_violations: u64,
    /// Shrinking re-executions performed.
    pub shrink_iterations: u64,
    /// WAL corruption records observed by engine opens, accumulated.
    pub wal_corruption_observed: u64,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunStats {
    /// Achieved injection ratio for `channel`.
    #[must_use]
    pub fn achieved_ratio(&self, channel: FaultChannel) -> f64 {
        self.injections.achieved_ratio(channel)
    }

    /// Configured target probability for `channel`.
    #[must_use]
    pub fn target_ratio(&self, channel: FaultChannel) -> f64 {
        self.targets[channel.index()]
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "sequences: {}  ops: {}/{} executed  restarts: {}  flushes: {}",
            self.sequences_run, self.ops_executed, self.ops_generated, self.restarts, self.flushes
        )?;
        writeln!(
            f,
            "op errors: {}  timeouts: {}  violations: {}  shrink iterations: {}",
            self.op_errors, self.timeouts, self.invariant_violations, self.shrink_iterations
        )?;
        for channel in FaultChannel::ALL {
            writeln!(
                f,
                "{:>14}: {:>6} hits / {:>7} rolls  achieved {:.4}  target {:.4}",
                channel.name(),
                self.injections.hits(channel),
                self.injections.rolls(channel),
                self.achieved_ratio(channel),
                self.target_ratio(channel),
            )?;
        }
        write!(
            f,
            "wal corruption observed: {}  duration: {:?}",
            self.wal_corruption_observed, self.duration
        )
    }
}
