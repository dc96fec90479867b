//! Deterministic operation-sequence generation.
//!
//! Generation is a pure function of `(seed, iteration)`: the same
//! configuration always yields the same sequences, which is what makes a
//! reported reproducer worth anything.

use crate::config::{KeyStrategy, TestConfig, ValueStrategy};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Per-iteration seed derivation constant (golden-ratio increment).
const ITERATION_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// One generated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Store `value` under `key`.
    Set {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Look up `key`.
    Get {
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Flush both logs.
    Flush,
    /// Drop the engine without flushing and reopen it.
    Restart,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { key, value } => write!(
                f,
                "SET {} {}",
                key.escape_ascii(),
                value.escape_ascii()
            ),
            Self::Get { key } => write!(f, "GET {}", key.escape_ascii()),
            Self::Delete { key } => write!(f, "DEL {}", key.escape_ascii()),
            Self::Flush => write!(f, "FLUSH"),
            Self::Restart => write!(f, "RESTART"),
        }
    }
}

/// Generates the operation sequence for one iteration.
#[must_use]
pub fn generate_sequence(config: &TestConfig, iteration: u32) -> Vec<Op> {
    let mut rng = ChaCha8Rng::seed_from_u64(
        config
            .seed
            .wrapping_add(u64::from(iteration).wrapping_mul(ITERATION_STRIDE)),
    );

    let (min_len, max_len) = config.sequence_length;
    let length = rng.gen_range(min_len..=max_len);

    let mut ops = Vec::with_capacity(length);
    let mut live_keys: Vec<Vec<u8>> = Vec::new();
    let mut sequential_counter = 0u64;

    for _ in 0..length {
        let roll: f64 = rng.gen();
        let mix = config.ops;

        if roll < mix.set {
            let key = synthesize_key(&config.keys, &mut rng, &live_keys, &mut sequential_counter);
            let value = synthesize_value(&config.values, &mut rng);
            if !live_keys.contains(&key) {
                live_keys.push(key.clone());
            }
            ops.push(Op::Set { key, value });
        } else if roll < mix.set + mix.get {
            ops.push(Op::Get {
                key: hit_or_fresh(config, &mut rng, &live_keys, &mut sequential_counter),
            });
        } else if roll < mix.set + mix.get + mix.delete {
            ops.push(Op::Delete {
                key: hit_or_fresh(config, &mut rng, &live_keys, &mut sequential_counter),
            });
        } else if roll < mix.set + mix.get + mix.delete + mix.flush {
            ops.push(Op::Flush);
        } else {
            ops.push(Op::Restart);
        }
    }

    ops
}

/// For GET and DEL: half the time draw from the live set to exercise hit
/// paths, otherwise synthesize a fresh key.
fn hit_or_fresh(
    config: &TestConfig,
    rng: &mut ChaCha8Rng,
    live_keys: &[Vec<u8>],
    counter: &mut u64,
) -> Vec<u8> {
    if !live_keys.is_empty() && rng.gen_bool(0.5) {
        if let Some(key) = live_keys.choose(rng) {
            return key.clone();
        }
    }
    synthesize_key(&config.keys, rng, live_keys, counter)
}

fn synthesize_key(
    strategy: &KeyStrategy,
    rng: &mut ChaCha8Rng,
    live_keys: &[Vec<u8>],
    counter: &mut u64,
) -> Vec<u8> {
    match strategy {
        KeyStrategy::UniformRandom { min, max } => lowercase(rng, *min.min(max), *max.max(min)),
        KeyStrategy::CollisionProne { rate } => {
            if !live_keys.is_empty() && rng.gen_bool(rate.clamp(0.0, 1.0)) {
                if let Some(existing) = live_keys.choose(rng) {
                    let mut key = existing.clone();
                    if let Some(first) = key.first_mut() {
                        *first ^= 0x01;
                    }
                    return key;
                }
            }
            lowercase(rng, 4, 8)
        }
        KeyStrategy::Sequential { prefix } => {
            let key = format!("{prefix}{:08}", *counter);
            *counter += 1;
            key.into_bytes()
        }
    }
}

fn synthesize_value(strategy: &ValueStrategy, rng: &mut ChaCha8Rng) -> Vec<u8> {
    match strategy {
        ValueStrategy::Fixed { len } => lowercase(rng, *len, *len),
        ValueStrategy::Variable { min, max } => lowercase(rng, *min.min(max), *max.max(min)),
        ValueStrategy::RandomBinary => {
            let len = rng.gen_range(1..=128);
            (0..len).map(|_| rng.gen()).collect()
        }
    }
}

fn lowercase(rng: &mut ChaCha8Rng, min: usize, max: usize) -> Vec<u8> {
    let len = if min >= max {
        min
    } else {
        rng.gen_range(min..=max)
    };
    (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}
