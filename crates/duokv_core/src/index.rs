//! Open-addressed hash index.
//!
//! Linear probing over owned key/value byte strings, with tombstones for
//! deletion and a hard probe bound of one full table sweep. The bound
//! means a lookup can never loop: a probe that visits `capacity` slots
//! without an answer reports exhaustion, and an insert that exhausts its
//! probes resizes once and retries before giving up.

use crate::error::{EngineError, EngineResult};
use xxhash_rust::xxh3::xxh3_64;

/// Maximum load factor after an insertion: 3/4.
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

/// One occupied slot. The slot exclusively owns its key and value bytes;
/// they are freed when the slot is overwritten with a new key or the
/// table is dropped.
#[derive(Debug)]
struct Slot {
    key: Vec<u8>,
    value: Vec<u8>,
    hash: u64,
    deleted: bool,
}

/// Point-in-time accounting for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    /// Count of present, non-deleted entries.
    pub size: usize,
    /// Total slot count.
    pub capacity: usize,
    /// Slots holding an entry, live or tombstoned.
    pub occupied_slots: usize,
}

/// Where a probe for an insertion landed.
enum InsertProbe {
    /// A live entry with the same key.
    Found(usize),
    /// A free slot (empty, or the first tombstone on the probe path).
    Vacant(usize),
    /// The probe bound was reached without a usable slot.
    Exhausted,
}

/// An open-addressed, linear-probing hash table over byte strings.
///
/// # Example
///
/// ```rust
/// use duokv_core::HashTable;
///
/// let mut table = HashTable::new(16);
/// table.set(b"key", b"value").unwrap();
/// assert_eq!(table.get(b"key"), Some(&b"value"[..]));
/// assert!(table.delete(b"key"));
/// assert_eq!(table.get(b"key"), None);
/// ```
#[derive(Debug)]
pub struct HashTable {
    slots: Vec<Option<Slot>>,
    size: usize,
}

impl HashTable {
    /// Creates a table with the given initial capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, size: 0 }
    }

    /// Returns the count of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns whether the table holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::OutOfMemory`] if a resize allocation fails
    /// - [`EngineError::ProbeExhausted`] if no slot is found even after
    ///   one resize-and-retry
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        let hash = xxh3_64(key);

        match self.probe_insert(hash, key) {
            InsertProbe::Found(i) => {
                self.overwrite(i, value);
                return Ok(());
            }
            InsertProbe::Vacant(i) => {
                self.place(i, hash, key, value);
            }
            InsertProbe::Exhausted => {
                // A full sweep found nothing usable; grow once and retry.
                self.resize()?;
                match self.probe_insert(hash, key) {
                    InsertProbe::Found(i) => {
                        self.overwrite(i, value);
                        return Ok(());
                    }
                    InsertProbe::Vacant(i) => self.place(i, hash, key, value),
                    InsertProbe::Exhausted => {
                        return Err(EngineError::ProbeExhausted {
                            capacity: self.capacity(),
                        })
                    }
                }
            }
        }

        if self.size * MAX_LOAD_DEN > self.capacity() * MAX_LOAD_NUM {
            self.resize()?;
        }
        Ok(())
    }

    /// Looks up `key`, returning a view of the live value.
    ///
    /// The view is borrowed; it is invalidated by the next mutation of
    /// the table.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let hash = xxh3_64(key);
        let capacity = self.capacity();
        let start = (hash % capacity as u64) as usize;

        for n in 0..capacity {
            let i = (start + n) % capacity;
            match &self.slots[i] {
                None => return None,
                Some(slot) => {
                    if !slot.deleted && slot.hash == hash && slot.key == key {
                        return Some(&slot.value);
                    }
                }
            }
        }
        None
    }

    /// Marks `key` deleted. Returns whether a live entry existed.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let hash = xxh3_64(key);
        let capacity = self.capacity();
        let start = (hash % capacity as u64) as usize;

        for n in 0..capacity {
            let i = (start + n) % capacity;
            match &mut self.slots[i] {
                None => return false,
                Some(slot) => {
                    if !slot.deleted && slot.hash == hash && slot.key == key {
                        slot.deleted = true;
                        self.size -= 1;
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Returns size, capacity, and occupied-slot accounting.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        TableStats {
            size: self.size,
            capacity: self.capacity(),
            occupied_slots: self.slots.iter().filter(|slot| slot.is_some()).count(),
        }
    }

    /// Verifies that the live-slot count matches `size`.
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        let live = self
            .slots
            .iter()
            .filter(|slot| matches!(slot, Some(s) if !s.deleted))
            .count();
        live == self.size
    }

    /// Probes for an insertion of `key`, remembering the first tombstone
    /// on the path so deleted slots get reused.
    fn probe_insert(&self, hash: u64, key: &[u8]) -> InsertProbe {
        let capacity = self.capacity();
        let start = (hash % capacity as u64) as usize;
        let mut first_tombstone = None;

        for n in 0..capacity {
            let i = (start + n) % capacity;
            match &self.slots[i] {
                None => return InsertProbe::Vacant(first_tombstone.unwrap_or(i)),
                Some(slot) => {
                    if slot.deleted {
                        if first_tombstone.is_none() {
                            first_tombstone = Some(i);
                        }
                    } else if slot.hash == hash && slot.key == key {
                        return InsertProbe::Found(i);
                    }
                }
            }
        }

        match first_tombstone {
            Some(i) => InsertProbe::Vacant(i),
            None => InsertProbe::Exhausted,
        }
    }

    fn overwrite(&mut self, i: usize, value: &[u8]) {
        if let Some(slot) = self.slots[i].as_mut() {
            slot.value.clear();
            slot.value.extend_from_slice(value);
        }
    }

    fn place(&mut self, i: usize, hash: u64, key: &[u8], value: &[u8]) {
        self.slots[i] = Some(Slot {
            key: key.to_vec(),
            value: value.to_vec(),
            hash,
            deleted: false,
        });
        self.size += 1;
    }

    /// Doubles the capacity and re-inserts every live entry. Hashes are
    /// cached, so keys are not re-hashed. Tombstones are dropped.
    ///
    /// Always makes room: live entries fit in less than half of the new
    /// table, so the bounded probe below cannot exhaust.
    fn resize(&mut self) -> EngineResult<()> {
        let new_capacity = self.capacity() * 2;
        let mut new_slots: Vec<Option<Slot>> = Vec::new();
        new_slots
            .try_reserve_exact(new_capacity)
            .map_err(|_| EngineError::OutOfMemory {
                requested: new_capacity * std::mem::size_of::<Option<Slot>>(),
            })?;
        new_slots.resize_with(new_capacity, || None);

        for slot in self.slots.drain(..).flatten() {
            if slot.deleted {
                continue;
            }
            let start = (slot.hash % new_capacity as u64) as usize;
            let mut placed = false;
            for n in 0..new_capacity {
                let i = (start + n) % new_capacity;
                if new_slots[i].is_none() {
                    new_slots[i] = Some(slot);
                    placed = true;
                    break;
                }
            }
            debug_assert!(placed, "resize target cannot be full");
        }

        self.slots = new_slots;
        Ok(())
    }
}
