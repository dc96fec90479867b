//! Invariants checked during execution.

use crate::config::Condition;
use crate::oracle::Oracle;
use duokv_core::Engine;
use std::fmt;

/// How consequential a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the iteration and triggers shrinking.
    Critical,
    /// Counted and reported; execution continues.
    Important,
    /// Logged only.
    Advisory,
}

/// When an invariant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFrequency {
    /// After every operation.
    EveryOperation,
    /// After every `n`-th operation.
    Periodic(u32),
    /// After operations executed while `Condition` is active.
    OnCondition(Condition),
    /// Once, after the sequence finishes.
    AtEnd,
}

/// Everything an invariant may inspect.
pub struct CheckContext<'a> {
    /// The engine under test.
    pub engine: &'a Engine,
    /// The reference model.
    pub oracle: &'a Oracle,
    /// Operations executed so far in this sequence.
    pub ops_executed: u64,
}

/// A named predicate over the engine and the model.
#[derive(Clone)]
pub struct Invariant {
    /// Name, used in reports.
    pub name: &'static str,
    /// Violation severity.
    pub severity: Severity,
    /// When the predicate runs.
    pub frequency: CheckFrequency,
    /// The predicate; `false` is a violation.
    pub check: fn(&CheckContext<'_>) -> bool,
}

impl fmt::Debug for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invariant")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("frequency", &self.frequency)
            .finish_non_exhaustive()
    }
}

/// The standard invariant suite.
///
/// - `index_accounting`: `verify_integrity()` holds (critical)
/// - `oracle_agreement`: every tracked key reads back as the model
///   expects (critical)
/// - `load_factor_bound`: live entries never exceed 3/4 of capacity
///   (important)
#[must_use]
pub fn standard_invariants() -> Vec<Invariant> {
    vec![
        Invariant {
            name: "index_accounting",
            severity: Severity::Critical,
            frequency: CheckFrequency::Periodic(16),
            check: index_accounting,
        },
        Invariant {
            name: "oracle_agreement",
            severity: Severity::Critical,
            frequency: CheckFrequency::Periodic(8),
            check: oracle_agreement,
        },
        Invariant {
            name: "load_factor_bound",
            severity: Severity::Important,
            frequency: CheckFrequency::Periodic(32),
            check: load_factor_bound,
        },
    ]
}

fn index_accounting(ctx: &CheckContext<'_>) -> bool {
    ctx.engine.verify_integrity()
}

fn oracle_agreement(ctx: &CheckContext<'_>) -> bool {
    ctx.oracle
        .keys()
        .all(|key| ctx.engine.get(key) == ctx.oracle.current(key))
}

fn load_factor_bound(ctx: &CheckContext<'_>) -> bool {
    let stats = ctx.engine.stats();
    stats.size * 4 <= stats.capacity * 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use duokv_storage::MemVfs;
    use std::path::Path;

    fn open_engine(vfs: &MemVfs) -> Engine {
        let (engine, _) =
            Engine::open(vfs, Path::new("intent.wal"), Path::new("completion.wal")).unwrap();
        engine
    }

    #[test]
    fn standard_suite_passes_on_agreeing_state() {
        let vfs = MemVfs::new();
        let mut engine = open_engine(&vfs);
        let mut oracle = Oracle::new();

        engine.set(b"a", b"1").unwrap();
        oracle.apply_set(b"a", b"1");

        let ctx = CheckContext {
            engine: &engine,
            oracle: &oracle,
            ops_executed: 1,
        };
        for invariant in standard_invariants() {
            assert!((invariant.check)(&ctx), "{} failed", invariant.name);
        }
    }

    #[test]
    fn oracle_agreement_detects_divergence() {
        let vfs = MemVfs::new();
        let engine = open_engine(&vfs);
        let mut oracle = Oracle::new();

        // The model believes a key exists that the engine never saw.
        oracle.apply_set(b"phantom", b"x");

        let ctx = CheckContext {
            engine: &engine,
            oracle: &oracle,
            ops_executed: 0,
        };
        assert!(!oracle_agreement(&ctx));
    }
}
