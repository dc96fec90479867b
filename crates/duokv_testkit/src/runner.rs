//! Sequence execution.
//!
//! One iteration = one generated sequence against a fresh engine on the
//! simulated filesystem. Faults are decided at each operation boundary,
//! invariants run on their configured cadence, and a critical violation
//! aborts the iteration and hands the sequence to the shrinker.

use crate::config::{Condition, TestConfig};
use crate::generators::{generate_sequence, Op};
use crate::inject::{apply_action, FaultAction, InjectorState};
use crate::invariants::{CheckContext, CheckFrequency, Severity};
use crate::oracle::Oracle;
use crate::stats::RunStats;
use duokv_core::{Engine, EngineResult};
use duokv_storage::{SimVfs, Vfs};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// A critical invariant violation.
#[derive(Debug, Clone)]
pub(crate) struct Violation {
    /// Index of the operation after which the check failed (one past the
    /// end for at-end checks).
    pub op_index: usize,
    /// Name of the violated invariant.
    pub invariant: &'static str,
}

/// The outcome of executing one sequence.
pub(crate) struct SequenceOutcome {
    pub violation: Option<Violation>,
    /// Fault actions per operation index, recorded in sampled mode so a
    /// shrunk sequence can replay the exact schedule.
    pub trace: Vec<Vec<FaultAction>>,
}

/// Details of a failed test, including the shrunk reproducer.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Iteration whose sequence violated an invariant.
    pub iteration: u32,
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Operation index at which the violation was first observed.
    pub op_index: usize,
    /// The shrunk minimal reproducer.
    pub minimal: Vec<Op>,
    /// Fault schedule aligned with `minimal`, for exact re-execution.
    pub schedule: Vec<Vec<FaultAction>>,
    /// Shrink candidates executed.
    pub shrink_attempts: u32,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "invariant '{}' violated at op {} of iteration {}",
            self.invariant, self.op_index, self.iteration
        )?;
        writeln!(
            f,
            "minimal reproducer ({} ops, {} shrink attempts):",
            self.minimal.len(),
            self.shrink_attempts
        )?;
        for (i, op) in self.minimal.iter().enumerate() {
            writeln!(f, "  {i:4}: {op}")?;
        }
        Ok(())
    }
}

/// The result of a whole test run.
#[derive(Debug)]
pub struct RunReport {
    /// Test name.
    pub name: String,
    /// Root seed, needed to re-execute the reproducer.
    pub seed: u64,
    /// Aggregate statistics.
    pub stats: RunStats,
    /// The failure, if any iteration violated a critical invariant.
    pub failure: Option<FailureReport>,
}

impl RunReport {
    /// Whether every iteration passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs a full test: `iterations` independent sequences.
///
/// Stops at the first critical violation, after shrinking it to a
/// minimal reproducer.
#[must_use]
pub fn run_test(config: &TestConfig) -> RunReport {
    let start = Instant::now();
    let mut stats = RunStats {
        targets: [
            config.faults.allocator,
            config.faults.filesystem,
            config.faults.wal_corruption,
            config.faults.ioring,
        ],
        ..RunStats::default()
    };
    let mut failure = None;

    info!(name = %config.name, seed = config.seed, iterations = config.iterations, "run start");

    for iteration in 0..config.iterations {
        let ops = generate_sequence(config, iteration);
        stats.ops_generated += ops.len() as u64;
        stats.sequences_run += 1;

        let vfs = SimVfs::new();
        let outcome = execute_sequence(config, &vfs, iteration, &ops, None, &mut stats);

        if let Some(violation) = outcome.violation {
            debug!(
                iteration,
                invariant = violation.invariant,
                op_index = violation.op_index,
                "critical violation, shrinking"
            );
            let (minimal, schedule, attempts) = crate::shrink::shrink(
                config,
                iteration,
                &ops,
                &outcome.trace,
                &violation,
                &mut stats,
            );
            failure = Some(FailureReport {
                iteration,
                invariant: violation.invariant,
                op_index: violation.op_index,
                minimal,
                schedule,
                shrink_attempts: attempts,
            });
            break;
        }
    }

    stats.duration = start.elapsed();
    RunReport {
        name: config.name.clone(),
        seed: config.seed,
        stats,
        failure,
    }
}

/// Re-executes an explicit operation sequence, such as a reported
/// reproducer. With `schedule` present, the recorded fault actions are
/// replayed positionally; otherwise no faults are injected. Returns the
/// name of the violated critical invariant, if any.
#[must_use]
pub fn replay_sequence(
    config: &TestConfig,
    iteration: u32,
    ops: &[Op],
    schedule: Option<&[Vec<FaultAction>]>,
) -> Option<&'static str> {
    static EMPTY: &[Vec<FaultAction>] = &[];
    let vfs = SimVfs::new();
    let mut scratch = RunStats::default();
    let outcome = execute_sequence(
        config,
        &vfs,
        iteration,
        ops,
        Some(schedule.unwrap_or(EMPTY)),
        &mut scratch,
    );
    outcome.violation.map(|violation| violation.invariant)
}

/// Executes one sequence. With `script` present, the recorded fault
/// schedule is replayed positionally instead of sampling fresh faults.
pub(crate) fn execute_sequence(
    config: &TestConfig,
    vfs: &SimVfs,
    iteration: u32,
    ops: &[Op],
    script: Option<&[Vec<FaultAction>]>,
    stats: &mut RunStats,
) -> SequenceOutcome {
    let intent_path = PathBuf::from(format!("{}-intent.wal", config.name));
    let completion_path = PathBuf::from(format!("{}-completion.wal", config.name));
    let _ = vfs.remove(&intent_path);
    let _ = vfs.remove(&completion_path);
    vfs.clear_faults();

    let mut injector = InjectorState::new(config, iteration);
    // Physical media faults void the flush guarantee; fall back to the
    // weaker "never a fabricated value" contract.
    let mut oracle = if config.faults.wal_corruption > 0.0 {
        Oracle::with_full_history()
    } else {
        Oracle::new()
    };
    let mut trace: Vec<Vec<FaultAction>> = Vec::with_capacity(ops.len());
    let started = Instant::now();

    injector.activate(Condition::DuringRecovery, None);
    let opened = open_engine(vfs, &intent_path, &completion_path, stats);
    injector.deactivate(Condition::DuringRecovery);
    let Ok(mut engine) = opened else {
        stats.op_errors += 1;
        return SequenceOutcome {
            violation: None,
            trace,
        };
    };

    let mut ops_executed = 0u64;

    for (op_index, op) in ops.iter().enumerate() {
        if started.elapsed() > config.iteration_timeout {
            stats.timeouts += 1;
            break;
        }

        injector.tick();

        let actions: Vec<FaultAction> = match script {
            Some(schedule) => schedule.get(op_index).cloned().unwrap_or_default(),
            None => injector.sample_actions(),
        };
        if script.is_none() {
            trace.push(actions.clone());
        }

        let mut skip = false;
        for action in &actions {
            if matches!(action, FaultAction::SkipOp) {
                // Allocation refused before the op reaches the engine.
                skip = true;
            } else {
                apply_action(action, vfs, &intent_path, &completion_path);
            }
        }
        if skip {
            continue;
        }

        stats.ops_executed += 1;
        ops_executed += 1;
        let capacity_before = engine.stats().capacity;

        match op {
            Op::Set { key, value } => match engine.set(key, value) {
                Ok(()) => oracle.apply_set(key, value),
                Err(_) => {
                    stats.op_errors += 1;
                    let observed = engine.get(key).map(<[u8]>::to_vec);
                    oracle.resync_key(key, observed.as_deref());
                }
            },
            Op::Get { key } => {
                let _ = engine.get(key);
            }
            Op::Delete { key } => match engine.delete(key) {
                Ok(_) => oracle.apply_delete(key),
                Err(_) => {
                    stats.op_errors += 1;
                    let observed = engine.get(key).map(<[u8]>::to_vec);
                    oracle.resync_key(key, observed.as_deref());
                }
            },
            Op::Flush => {
                injector.activate(Condition::DuringFlush, None);
                let result = engine.flush();
                injector.deactivate(Condition::DuringFlush);
                match result {
                    Ok(()) => {
                        stats.flushes += 1;
                        oracle.mark_flushed();
                    }
                    Err(_) => stats.op_errors += 1,
                }
            }
            Op::Restart => {
                stats.restarts += 1;
                // Crash-style: drop without close, abandoning unflushed
                // appends.
                drop(engine);

                injector.activate(Condition::DuringRecovery, None);
                let reopened = open_engine(vfs, &intent_path, &completion_path, stats);
                injector.deactivate(Condition::DuringRecovery);

                match reopened {
                    Ok(e) => engine = e,
                    Err(_) => {
                        stats.op_errors += 1;
                        return SequenceOutcome {
                            violation: None,
                            trace,
                        };
                    }
                }

                let after_duration = config
                    .multiplier_for(Condition::AfterRestart)
                    .map(|m| m.duration_ops)
                    .filter(|d| *d > 0);
                injector.activate(Condition::AfterRestart, after_duration);

                // Every tracked key must read back some value it actually
                // held since the durability boundary.
                let mut recovered_badly = false;
                for key in oracle.keys() {
                    if !oracle.admissible_after_restart(key, engine.get(key)) {
                        recovered_badly = true;
                        break;
                    }
                }
                if recovered_badly {
                    stats.invariant_violations += 1;
                    return SequenceOutcome {
                        violation: Some(Violation {
                            op_index,
                            invariant: "recovery_prefix_consistency",
                        }),
                        trace,
                    };
                }

                // The recovered engine becomes the model's new baseline.
                oracle.rebase(|key| engine.get(key));
            }
        }

        let resized =
            engine.stats().capacity != capacity_before && !matches!(op, Op::Restart);
        if resized {
            if let Some(m) = config.multiplier_for(Condition::HashTableResize) {
                let duration = (m.duration_ops > 0).then_some(m.duration_ops);
                injector.activate(Condition::HashTableResize, duration);
            }
        }

        if let Some(violation) = check_invariants(
            config,
            &engine,
            &oracle,
            &injector,
            ops_executed,
            op_index,
            false,
            stats,
        ) {
            return SequenceOutcome {
                violation: Some(violation),
                trace,
            };
        }
    }

    let violation = check_invariants(
        config,
        &engine,
        &oracle,
        &injector,
        ops_executed,
        ops.len(),
        true,
        stats,
    );
    SequenceOutcome { violation, trace }
}

fn open_engine(
    vfs: &SimVfs,
    intent_path: &Path,
    completion_path: &Path,
    stats: &mut RunStats,
) -> EngineResult<Engine> {
    let (engine, corruption) = Engine::open(vfs, intent_path, completion_path)?;
    stats.wal_corruption_observed += corruption;
    Ok(engine)
}

#[allow(clippy::too_many_arguments)]
fn check_invariants(
    config: &TestConfig,
    engine: &Engine,
    oracle: &Oracle,
    injector: &InjectorState,
    ops_executed: u64,
    op_index: usize,
    at_end: bool,
    stats: &mut RunStats,
) -> Option<Violation> {
    let ctx = CheckContext {
        engine,
        oracle,
        ops_executed,
    };

    for invariant in &config.invariants {
        let due = match invariant.frequency {
            CheckFrequency::EveryOperation => !at_end,
            CheckFrequency::Periodic(n) => !at_end && n > 0 && ops_executed % u64::from(n) == 0,
            CheckFrequency::OnCondition(condition) => !at_end && injector.is_active(condition),
            CheckFrequency::AtEnd => at_end,
        };
        if !due || (invariant.check)(&ctx) {
            continue;
        }

        stats.invariant_violations += 1;
        match invariant.severity {
            Severity::Critical => {
                return Some(Violation {
                    op_index,
                    invariant: invariant.name,
                });
            }
            Severity::Important => {
                debug!(invariant = invariant.name, op_index, "important invariant failed");
            }
            Severity::Advisory => {
                debug!(invariant = invariant.name, op_index, "advisory invariant failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FaultProbabilities, KeyStrategy};
    use crate::invariants::{Invariant, Severity};

    #[test]
    fn clean_run_passes() {
        let config = TestConfig::new("clean").seed(1).iterations(3);
        let report = run_test(&config);
        assert!(report.passed());
        assert_eq!(report.stats.sequences_run, 3);
        assert!(report.stats.ops_executed > 0);
        assert_eq!(report.stats.invariant_violations, 0);
        assert_eq!(report.stats.wal_corruption_observed, 0);
    }

    #[test]
    fn allocator_faults_skip_operations() {
        let config = TestConfig::new("skips")
            .seed(2)
            .iterations(2)
            .faults(FaultProbabilities {
                allocator: 1.0,
                ..FaultProbabilities::default()
            });
        let report = run_test(&config);
        assert!(report.passed());
        // Every operation was refused at the boundary.
        assert_eq!(report.stats.ops_executed, 0);
        assert!(report.stats.injections.hits(crate::FaultChannel::Allocator) > 0);
    }

    #[test]
    fn wal_corruption_is_survived_and_observed() {
        let config = TestConfig::new("corrupt")
            .seed(3)
            .iterations(5)
            .ops(0.5, 0.2, 0.1, 0.1, 0.1)
            .faults(FaultProbabilities {
                wal_corruption: 0.2,
                ..FaultProbabilities::default()
            });
        let report = run_test(&config);
        assert!(report.passed(), "failure: {:?}", report.failure);
        // With this much damage and frequent restarts, replay must have
        // seen at least one corrupt record.
        assert!(report.stats.restarts > 0);
        assert!(report.stats.wal_corruption_observed > 0);
    }

    #[test]
    fn failing_invariant_produces_a_reproducer() {
        fn at_most_three_live_keys(ctx: &CheckContext<'_>) -> bool {
            ctx.engine.stats().size <= 3
        }

        let config = TestConfig::new("tiny-cap")
            .seed(4)
            .iterations(1)
            .ops(1.0, 0.0, 0.0, 0.0, 0.0)
            .keys(KeyStrategy::Sequential {
                prefix: "key".into(),
            })
            .sequence_length(40, 40)
            .invariants(vec![Invariant {
                name: "at_most_three_live_keys",
                severity: Severity::Critical,
                frequency: CheckFrequency::EveryOperation,
                check: at_most_three_live_keys,
            }]);

        let report = run_test(&config);
        assert!(!report.passed());
        let failure = report.failure.unwrap();
        assert_eq!(failure.invariant, "at_most_three_live_keys");
        // Four distinct sets suffice; the shrinker must get close.
        assert!(
            failure.minimal.len() < 40,
            "shrinker made no progress: {} ops",
            failure.minimal.len()
        );
    }

    #[test]
    fn restarts_preserve_flushed_data() {
        let config = TestConfig::new("restarts")
            .seed(5)
            .iterations(5)
            .ops(0.4, 0.2, 0.1, 0.15, 0.15);
        let report = run_test(&config);
        assert!(report.passed(), "failure: {:?}", report.failure);
        assert!(report.stats.restarts > 0);
        assert!(report.stats.flushes > 0);
    }
}
