//! Named, ready-made test configurations.

use crate::config::{
    Condition, ConditionalMultiplier, FaultProbabilities, KeyStrategy, TestConfig, ValueStrategy,
};

/// Default seed used by the runners when none is given.
pub const DEFAULT_SEED: u64 = 12345;

/// Names of all built-in scenarios.
#[must_use]
pub fn scenario_names() -> &'static [&'static str] {
    &[
        "wal_stress",
        "collision_storm",
        "recovery_torture",
        "quiet_baseline",
    ]
}

/// Looks up a built-in scenario by name.
#[must_use]
pub fn scenario(name: &str) -> Option<TestConfig> {
    match name {
        "wal_stress" => Some(wal_stress()),
        "collision_storm" => Some(collision_storm()),
        "recovery_torture" => Some(recovery_torture()),
        "quiet_baseline" => Some(quiet_baseline()),
        _ => None,
    }
}

/// The workhorse: every fault channel live at modest rates, restarts
/// mixed in, conditional multipliers armed.
#[must_use]
pub fn wal_stress() -> TestConfig {
    TestConfig::new("wal_stress")
        .seed(DEFAULT_SEED)
        .iterations(50)
        .ops(0.50, 0.26, 0.15, 0.08, 0.01)
        .keys(KeyStrategy::UniformRandom { min: 4, max: 16 })
        .values(ValueStrategy::Variable { min: 8, max: 64 })
        .sequence_length(200, 400)
        .faults(FaultProbabilities {
            allocator: 0.02,
            filesystem: 0.005,
            wal_corruption: 0.002,
            ioring: 0.002,
            multipliers: vec![
                ConditionalMultiplier {
                    condition: Condition::DuringRecovery,
                    multiplier: 2.0,
                    duration_ops: 0,
                },
                ConditionalMultiplier {
                    condition: Condition::DuringFlush,
                    multiplier: 1.5,
                    duration_ops: 0,
                },
                ConditionalMultiplier {
                    condition: Condition::AfterRestart,
                    multiplier: 2.0,
                    duration_ops: 5,
                },
            ],
        })
}

/// Near-colliding keys hammering probe chains, with allocator refusals.
#[must_use]
pub fn collision_storm() -> TestConfig {
    TestConfig::new("collision_storm")
        .seed(DEFAULT_SEED)
        .iterations(20)
        .ops(0.60, 0.20, 0.20, 0.0, 0.0)
        .keys(KeyStrategy::CollisionProne { rate: 0.8 })
        .values(ValueStrategy::Fixed { len: 16 })
        .sequence_length(300, 600)
        .faults(FaultProbabilities {
            allocator: 0.02,
            ..FaultProbabilities::default()
        })
}

/// Frequent crash-style restarts with physical log damage.
#[must_use]
pub fn recovery_torture() -> TestConfig {
    TestConfig::new("recovery_torture")
        .seed(DEFAULT_SEED)
        .iterations(25)
        .ops(0.40, 0.20, 0.10, 0.15, 0.15)
        .keys(KeyStrategy::UniformRandom { min: 4, max: 12 })
        .values(ValueStrategy::RandomBinary)
        .sequence_length(100, 250)
        .faults(FaultProbabilities {
            allocator: 0.01,
            filesystem: 0.01,
            wal_corruption: 0.01,
            ioring: 0.005,
            multipliers: vec![ConditionalMultiplier {
                condition: Condition::DuringRecovery,
                multiplier: 3.0,
                duration_ops: 0,
            }],
        })
}

/// No faults at all; a sanity baseline for the harness itself.
#[must_use]
pub fn quiet_baseline() -> TestConfig {
    TestConfig::new("quiet_baseline")
        .seed(DEFAULT_SEED)
        .iterations(10)
        .ops(0.45, 0.30, 0.15, 0.07, 0.03)
        .keys(KeyStrategy::Sequential {
            prefix: "key".into(),
        })
        .values(ValueStrategy::Variable { min: 4, max: 32 })
        .sequence_length(100, 200)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_resolves() {
        for name in scenario_names() {
            let config = scenario(name).unwrap();
            assert_eq!(&config.name, name);
        }
        assert!(scenario("nope").is_none());
    }

    #[test]
    fn wal_stress_weights_are_normalized() {
        let config = wal_stress();
        let mix = config.ops;
        let sum = mix.set + mix.get + mix.delete + mix.flush + mix.restart;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
