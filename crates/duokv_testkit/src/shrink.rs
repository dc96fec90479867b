//! Automatic test-case shrinking.
//!
//! On a critical violation the failing sequence is repeatedly reduced;
//! a candidate is accepted when re-execution still violates a critical
//! invariant. With `preserve_failure_conditions` the recorded fault
//! schedule is replayed positionally, so reductions cannot lose the
//! faults that provoked the failure.

use crate::config::{ShrinkStrategy, TestConfig};
use crate::generators::Op;
use crate::inject::FaultAction;
use crate::runner::{execute_sequence, Violation};
use crate::stats::RunStats;
use duokv_storage::SimVfs;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed-stream separator for shrink randomness.
const SHRINK_STREAM: u64 = 0x5A5A_1234_ABCD_0001;

/// Operations kept on each side of the violation by the focus strategy.
const FOCUS_WINDOW: usize = 16;

/// Shrinks `ops` while preserving the failure. Returns the minimal
/// sequence found, its aligned fault schedule, and the number of
/// candidate re-executions.
pub(crate) fn shrink(
    config: &TestConfig,
    iteration: u32,
    ops: &[Op],
    trace: &[Vec<FaultAction>],
    violation: &Violation,
    stats: &mut RunStats,
) -> (Vec<Op>, Vec<Vec<FaultAction>>, u32) {
    let settings = &config.shrink;
    let preserve = settings.preserve_failure_conditions
        || settings
            .strategies
            .contains(&ShrinkStrategy::PreserveFailurePattern);

    let mut best_ops = ops.to_vec();
    let mut best_trace = trace.to_vec();
    let mut best_violation = violation.clone();
    let mut attempts = 0u32;
    let mut rng =
        ChaCha8Rng::seed_from_u64(config.seed ^ SHRINK_STREAM ^ u64::from(iteration));

    'outer: loop {
        let mut improved = false;

        for strategy in &settings.strategies {
            if attempts >= settings.max_attempts {
                break 'outer;
            }

            let Some((candidate_ops, candidate_trace)) = propose(
                *strategy,
                &best_ops,
                &best_trace,
                &best_violation,
                &mut rng,
            ) else {
                continue;
            };

            attempts += 1;
            stats.shrink_iterations += 1;

            // Re-execute against scratch statistics so shrink runs do not
            // skew the run's achieved-ratio reporting.
            let mut scratch = RunStats::default();
            let vfs = SimVfs::new();
            let script = if preserve {
                Some(candidate_trace.as_slice())
            } else {
                None
            };
            let outcome =
                execute_sequence(config, &vfs, iteration, &candidate_ops, script, &mut scratch);

            if let Some(new_violation) = outcome.violation {
                best_ops = candidate_ops;
                best_trace = candidate_trace;
                best_violation = new_violation;
                improved = true;
            }
        }

        if !improved {
            break;
        }
    }

    (best_ops, best_trace, attempts)
}

/// Produces one reduction candidate, or `None` when the strategy has
/// nothing left to try.
fn propose(
    strategy: ShrinkStrategy,
    ops: &[Op],
    trace: &[Vec<FaultAction>],
    violation: &Violation,
    rng: &mut ChaCha8Rng,
) -> Option<(Vec<Op>, Vec<Vec<FaultAction>>)> {
    match strategy {
        ShrinkStrategy::RemoveOperations => {
            if ops.len() <= 1 {
                return None;
            }
            let index = rng.gen_range(0..ops.len());
            let mut new_ops = ops.to_vec();
            new_ops.remove(index);
            let mut new_trace = trace.to_vec();
            if index < new_trace.len() {
                new_trace.remove(index);
            }
            Some((new_ops, new_trace))
        }

        ShrinkStrategy::SimplifyValues => {
            let candidates: Vec<usize> = ops
                .iter()
                .enumerate()
                .filter_map(|(i, op)| match op {
                    Op::Set { value, .. } if value.len() > 1 => Some(i),
                    _ => None,
                })
                .collect();
            let index = *candidates.choose(rng)?;

            let mut new_ops = ops.to_vec();
            if let Op::Set { value, .. } = &mut new_ops[index] {
                if value.len() > 4 {
                    value.truncate(value.len() / 2);
                } else {
                    *value = b"x".to_vec();
                }
            }
            Some((new_ops, trace.to_vec()))
        }

        ShrinkStrategy::ReduceKeyDiversity => {
            let mut keys: Vec<&Vec<u8>> = Vec::new();
            for op in ops {
                if let Op::Set { key, .. } | Op::Get { key } | Op::Delete { key } = op {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            if keys.len() < 2 {
                return None;
            }

            let canonical = keys[rng.gen_range(0..keys.len())].clone();
            let victim = loop {
                let candidate = keys[rng.gen_range(0..keys.len())].clone();
                if candidate != canonical {
                    break candidate;
                }
            };

            let mut new_ops = ops.to_vec();
            for op in &mut new_ops {
                if let Op::Set { key, .. } | Op::Get { key } | Op::Delete { key } = op {
                    if *key == victim {
                        *key = canonical.clone();
                    }
                }
            }
            Some((new_ops, trace.to_vec()))
        }

        ShrinkStrategy::FocusAroundFailure => {
            if ops.is_empty() {
                return None;
            }
            let pivot = violation.op_index.min(ops.len() - 1);
            let start = pivot.saturating_sub(FOCUS_WINDOW);
            let end = (pivot + 1).min(ops.len());
            if start == 0 && end == ops.len() {
                return None;
            }
            let new_ops = ops[start..end].to_vec();
            let new_trace = trace[start.min(trace.len())..end.min(trace.len())].to_vec();
            Some((new_ops, new_trace))
        }

        // Not a reduction: it governs how re-executions are performed
        // (see the `preserve` flag in `shrink`).
        ShrinkStrategy::PreserveFailurePattern => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &[u8], value: &[u8]) -> Op {
        Op::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn remove_drops_one_op_and_its_trace_entry() {
        let ops = vec![set(b"a", b"1"), set(b"b", b"2"), set(b"c", b"3")];
        let trace = vec![vec![], vec![FaultAction::FsDiskFull], vec![]];
        let violation = Violation {
            op_index: 2,
            invariant: "x",
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let (new_ops, new_trace) = propose(
            ShrinkStrategy::RemoveOperations,
            &ops,
            &trace,
            &violation,
            &mut rng,
        )
        .unwrap();
        assert_eq!(new_ops.len(), 2);
        assert_eq!(new_trace.len(), 2);
    }

    #[test]
    fn simplify_shortens_a_value() {
        let ops = vec![set(b"a", b"a-rather-long-value")];
        let violation = Violation {
            op_index: 0,
            invariant: "x",
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let (new_ops, _) = propose(
            ShrinkStrategy::SimplifyValues,
            &ops,
            &[vec![]],
            &violation,
            &mut rng,
        )
        .unwrap();
        let Op::Set { value, .. } = &new_ops[0] else {
            panic!("expected a set");
        };
        assert!(value.len() < 19);
    }

    #[test]
    fn reduce_collapses_keys() {
        let ops = vec![set(b"a", b"1"), set(b"b", b"2")];
        let violation = Violation {
            op_index: 1,
            invariant: "x",
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let (new_ops, _) = propose(
            ShrinkStrategy::ReduceKeyDiversity,
            &ops,
            &[vec![], vec![]],
            &violation,
            &mut rng,
        )
        .unwrap();

        let keys: std::collections::HashSet<Vec<u8>> = new_ops
            .iter()
            .filter_map(|op| match op {
                Op::Set { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn focus_keeps_a_window_around_the_violation() {
        let ops: Vec<Op> = (0..100u8).map(|i| set(&[i], b"v")).collect();
        let trace: Vec<Vec<FaultAction>> = vec![vec![]; 100];
        let violation = Violation {
            op_index: 60,
            invariant: "x",
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let (new_ops, new_trace) = propose(
            ShrinkStrategy::FocusAroundFailure,
            &ops,
            &trace,
            &violation,
            &mut rng,
        )
        .unwrap();
        assert!(new_ops.len() <= FOCUS_WINDOW + 1);
        assert_eq!(new_ops.len(), new_trace.len());
        // The violating op itself is retained.
        assert_eq!(new_ops.last(), Some(&set(&[60], b"v")));
    }

    #[test]
    fn single_op_sequences_cannot_shrink_further() {
        let ops = vec![set(b"a", b"1")];
        let violation = Violation {
            op_index: 0,
            invariant: "x",
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        assert!(propose(
            ShrinkStrategy::RemoveOperations,
            &ops,
            &[vec![]],
            &violation,
            &mut rng
        )
        .is_none());
    }
}
