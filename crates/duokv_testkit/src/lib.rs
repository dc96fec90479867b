//! # DuoKV Testkit
//!
//! Property tester for the DuoKV engine.
//!
//! A test is a fully-declarative [`TestConfig`]: operation-type
//! distribution, key and value strategies, per-channel fault
//! probabilities with conditional multipliers, an invariant list, and
//! shrinking settings. The runner generates operation sequences as a pure
//! function of `(seed, iteration)`, executes them against a fresh engine
//! on the simulated filesystem, injects faults at the operation boundary,
//! and checks invariants as it goes.
//!
//! Operation errors are **normal outcomes** under fault injection; only
//! an invariant violation fails a test. On a critical violation the
//! failing sequence is shrunk to a minimal reproducer and reported with
//! its seed.
//!
//! ## Example
//!
//! ```rust
//! use duokv_testkit::{run_test, scenario};
//!
//! let config = scenario("quiet_baseline").unwrap().seed(7).iterations(3);
//! let report = run_test(&config);
//! assert!(report.passed());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod generators;
pub mod inject;
pub mod invariants;
pub mod oracle;
pub mod runner;
pub mod scenarios;
pub mod shrink;
pub mod stats;

pub use config::{
    Condition, ConditionalMultiplier, FaultProbabilities, KeyStrategy, OpMix, ShrinkConfig,
    ShrinkStrategy, TestConfig, ValueStrategy,
};
pub use generators::{generate_sequence, Op};
pub use inject::{FaultAction, FaultChannel, InjectorState};
pub use invariants::{standard_invariants, CheckContext, CheckFrequency, Invariant, Severity};
pub use oracle::Oracle;
pub use runner::{replay_sequence, run_test, FailureReport, RunReport};
pub use scenarios::{scenario, scenario_names};
pub use stats::RunStats;
