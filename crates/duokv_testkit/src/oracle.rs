//! Reference model with durability awareness.
//!
//! The oracle tracks, per key, every value the key has held since the
//! last successful flush (including absence). During normal operation the
//! engine must agree with the newest version; after a crash-style
//! restart, any version since the flush boundary is admissible - the
//! tail may have been lost, threshold flushes may have saved part of it -
//! but a value the key *never* held is a violation.

use std::collections::HashMap;

/// One admissible state of a key: present with a value, or absent.
type Version = Option<Vec<u8>>;

/// The reference model.
#[derive(Debug, Default)]
pub struct Oracle {
    /// Versions per key since the last flush; the first entry is the
    /// durable-as-of-last-flush state, the last is the expected current
    /// state. Keys never touched are implicitly `[None]`.
    history: HashMap<Vec<u8>, Vec<Version>>,
    /// Keep every version a key ever held instead of truncating at flush
    /// boundaries. Required when physical media faults are injected:
    /// damage can push a key back to *any* genuinely written value, and
    /// the only hard guarantee left is that values are never fabricated.
    full_history: bool,
}

impl Oracle {
    /// Creates an empty oracle with flush-boundary truncation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an oracle that keeps full per-key history, for runs that
    /// physically damage the logs.
    #[must_use]
    pub fn with_full_history() -> Self {
        Self {
            history: HashMap::new(),
            full_history: true,
        }
    }

    /// Records a successful `set`.
    pub fn apply_set(&mut self, key: &[u8], value: &[u8]) {
        self.entry(key).push(Some(value.to_vec()));
    }

    /// Records a successful `delete`.
    pub fn apply_delete(&mut self, key: &[u8]) {
        self.entry(key).push(None);
    }

    /// Records a successful flush: the current state becomes the durable
    /// baseline and older versions stop being admissible.
    pub fn mark_flushed(&mut self) {
        if self.full_history {
            return;
        }
        for versions in self.history.values_mut() {
            if versions.len() > 1 {
                versions.drain(..versions.len() - 1);
            }
        }
    }

    /// Re-anchors a key's history at its observed state. Used when an
    /// operation failed mid-way and the engine is the only authority on
    /// what actually happened.
    pub fn resync_key(&mut self, key: &[u8], observed: Option<&[u8]>) {
        let observed = observed.map(<[u8]>::to_vec);
        if self.full_history {
            self.entry(key).push(observed);
        } else {
            self.history.insert(key.to_vec(), vec![observed]);
        }
    }

    /// The expected current value of `key`.
    #[must_use]
    pub fn current(&self, key: &[u8]) -> Option<&[u8]> {
        self.history
            .get(key)
            .and_then(|versions| versions.last())
            .and_then(|version| version.as_deref())
    }

    /// Whether `observed` is an admissible post-restart state for `key`.
    #[must_use]
    pub fn admissible_after_restart(&self, key: &[u8], observed: Option<&[u8]>) -> bool {
        match self.history.get(key) {
            Some(versions) => versions
                .iter()
                .any(|version| version.as_deref() == observed),
            // An untouched key must stay absent.
            None => observed.is_none(),
        }
    }

    /// Every key the model has seen.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.history.keys().map(Vec::as_slice)
    }

    /// Number of keys expected to be live right now.
    #[must_use]
    pub fn live_keys(&self) -> usize {
        self.history
            .values()
            .filter(|versions| matches!(versions.last(), Some(Some(_))))
            .count()
    }

    /// Re-anchors every key at its observed post-restart state, making
    /// the recovered engine the new baseline.
    pub fn rebase<'a>(&mut self, mut observe: impl FnMut(&[u8]) -> Option<&'a [u8]>) {
        let keys: Vec<Vec<u8>> = self.history.keys().cloned().collect();
        for key in keys {
            let observed = observe(&key).map(<[u8]>::to_vec);
            if self.full_history {
                self.entry(&key).push(observed);
            } else {
                self.history.insert(key, vec![observed]);
            }
        }
    }

    fn entry(&mut self, key: &[u8]) -> &mut Vec<Version> {
        self.history
            .entry(key.to_vec())
            .or_insert_with(|| vec![None])
    }
}
