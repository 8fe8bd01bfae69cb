//! Single-threaded SwissTable engine — component D.
//!
//! [`HashSmithMap`] is an open-addressing hash table with fingerprinted
//! control bytes, SWAR group scanning (component C), and triangular group
//! probing. It has no internal synchronization: concurrent external use is
//! undefined (see the crate-level concurrency notes).
//!
//! ## Probing
//!
//! A lookup starts at group `h1 & group_mask` and steps `+1, +2, +3, …`
//! groups (mod group count) on a miss. Because the group count is always a
//! power of two, this triangular sequence visits every group exactly once
//! before repeating, which is what guarantees termination on an EMPTY lane.
//!
//! ## Tombstones
//!
//! Because probing is triangular rather than linear, a removed slot cannot
//! be closed up by shifting later entries backward — they may no longer be
//! reachable from their original probe sequence. Deletion therefore leaves
//! a DELETED control byte (a tombstone) that later insertions may reuse,
//! and [`HashSmithMap::remove`] triggers a same-capacity rehash once
//! tombstones begin to dominate live entries.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

use crate::control;
use crate::group::{self, WIDTH};
use crate::hash::split_hash;
use crate::map::{self, HashSmithView, MapError, DEFAULT_LOAD_FACTOR};

#[cfg(test)]
mod tests;

/// Where a key was found (or where it should be inserted).
enum Slot {
    Occupied(usize),
    Vacant { idx: usize, h2: u8 },
}

/// A single-threaded, open-addressing hash table.
///
/// `S` is the [`BuildHasher`] used to derive the 32-bit seed fed to the
/// hash mixer (component A); it defaults to the standard library's
/// `RandomState`.
pub struct HashSmithMap<K, V, S = RandomState> {
    control: Vec<u8>,
    keys: Vec<Option<K>>,
    values: Vec<Option<V>>,
    group_mask: usize,
    size: usize,
    tombstones: usize,
    max_load: usize,
    load_factor: f64,
    hasher: S,
}

impl<K, V> Default for HashSmithMap<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashSmithMap<K, V, RandomState> {
    /// Creates an empty map with the default capacity (8 slots) and load
    /// factor (7/8).
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map whose initial slot count is `capacity` rounded
    /// up to the next power of two of at least 8 groups. Note this sizes
    /// the raw table, not a guaranteed entry count: at the default load
    /// factor `max_load` is always below `capacity`, so inserting exactly
    /// `capacity` entries can still trigger a resize.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V, S: BuildHasher> HashSmithMap<K, V, S> {
    /// Creates an empty map using a custom [`BuildHasher`].
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self::try_with_capacity_and_load_factor(capacity, DEFAULT_LOAD_FACTOR, hasher)
            .expect("default load factor is always valid")
    }

    /// Creates an empty map with an explicit load factor, failing on an
    /// invalid load factor or an unrepresentable capacity instead of
    /// panicking.
    pub fn try_with_capacity_and_load_factor(
        capacity: usize,
        load_factor: f64,
        hasher: S,
    ) -> Result<Self, MapError> {
        map::validate_load_factor(load_factor)?;
        let requested_capacity = capacity_for_entries(capacity)?;
        Ok(Self::empty_table(requested_capacity, load_factor, hasher))
    }

    fn empty_table(capacity: usize, load_factor: f64, hasher: S) -> Self {
        debug_assert!(capacity >= WIDTH && capacity.is_power_of_two());
        Self {
            control: vec![control::EMPTY; capacity],
            keys: (0..capacity).map(|_| None).collect(),
            values: (0..capacity).map(|_| None).collect(),
            group_mask: capacity / WIDTH - 1,
            size: 0,
            tombstones: 0,
            max_load: max_load_for(capacity, load_factor),
            load_factor,
            hasher,
        }
    }

    /// Total slot count. Always a power of two, at least 8.
    pub fn capacity(&self) -> usize {
        self.control.len()
    }

    fn groups(&self) -> usize {
        self.control.len() / WIDTH
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the map holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of DELETED control bytes currently outstanding.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    fn load_group_word(&self, group: usize) -> u64 {
        let start = group * WIDTH;
        group::load(&self.control[start..start + WIDTH])
    }

    /// Locates `key`: either the occupied slot holding it, or the slot
    /// (reusing the first DELETED lane seen, else the first EMPTY lane)
    /// where it should be inserted.
    fn find(&self, key: &K) -> Slot
    where
        K: Hash + Eq,
    {
        let (h1, h2) = split_hash(key, &self.hasher);
        let groups = self.groups();
        let mut g = h1 & self.group_mask;
        let mut step = 0usize;
        let mut reuse: Option<usize> = None;

        for _ in 0..groups {
            let word = self.load_group_word(g);

            let mut matches = group::eq_mask(word, h2);
            while matches != 0 {
                let lane = matches.trailing_zeros() as usize;
                matches &= matches - 1;
                let idx = g * WIDTH + lane;
                if self.keys[idx].as_ref() == Some(key) {
                    return Slot::Occupied(idx);
                }
            }

            if reuse.is_none() {
                for lane in 0..WIDTH {
                    let idx = g * WIDTH + lane;
                    if control::is_deleted(self.control[idx]) {
                        reuse = Some(idx);
                        break;
                    }
                }
            }

            let empties = group::empty_mask(word);
            if empties != 0 {
                let lane = empties.trailing_zeros() as usize;
                let empty_idx = g * WIDTH + lane;
                return Slot::Vacant { idx: reuse.unwrap_or(empty_idx), h2 };
            }

            step += 1;
            g = (g + step) & self.group_mask;
        }

        unreachable!(
            "triangular probing visited every group without an EMPTY lane; \
             size + tombstones <= max_load invariant was violated"
        )
    }

    /// Looks up `key`.
    pub fn get(&self, key: &K) -> Option<&V>
    where
        K: Hash + Eq,
    {
        match self.find(key) {
            Slot::Occupied(idx) => self.values[idx].as_ref(),
            Slot::Vacant { .. } => None,
        }
    }

    /// Looks up `key`, returning a mutable reference.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V>
    where
        K: Hash + Eq,
    {
        match self.find(key) {
            Slot::Occupied(idx) => self.values[idx].as_mut(),
            Slot::Vacant { .. } => None,
        }
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool
    where
        K: Hash + Eq,
    {
        matches!(self.find(key), Slot::Occupied(_))
    }

    /// Whether any live entry equals `value`. A linear scan: the
    /// single-threaded engine keeps no secondary value index.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.control
            .iter()
            .zip(self.values.iter())
            .any(|(&ctrl, v)| control::is_full(ctrl) && v.as_ref() == Some(value))
    }

    /// Inserts `key => value`, returning the prior value if `key` was
    /// already present.
    pub fn put(&mut self, key: K, value: V) -> Option<V>
    where
        K: Hash + Eq,
    {
        self.reserve_for_insert(1);
        match self.find(&key) {
            Slot::Occupied(idx) => self.values[idx].replace(value),
            Slot::Vacant { idx, h2 } => {
                self.write_vacant(idx, h2, key, value);
                None
            }
        }
    }

    /// Inserts `key => value` only if `key` is absent, returning the
    /// existing value otherwise.
    pub fn put_if_absent(&mut self, key: K, value: V) -> Option<&V>
    where
        K: Hash + Eq,
    {
        self.reserve_for_insert(1);
        match self.find(&key) {
            Slot::Occupied(idx) => self.values[idx].as_ref(),
            Slot::Vacant { idx, h2 } => {
                self.write_vacant(idx, h2, key, value);
                None
            }
        }
    }

    /// Updates `key`'s value only if it is already present.
    pub fn replace(&mut self, key: &K, value: V) -> Option<V>
    where
        K: Hash + Eq,
    {
        match self.find(key) {
            Slot::Occupied(idx) => self.values[idx].replace(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Updates `key`'s value to `new` only if its current value equals
    /// `old` — a single-threaded compare-and-swap.
    pub fn replace_exact(&mut self, key: &K, old: &V, new: V) -> bool
    where
        K: Hash + Eq,
        V: PartialEq,
    {
        match self.find(key) {
            Slot::Occupied(idx) if self.values[idx].as_ref() == Some(old) => {
                self.values[idx] = Some(new);
                true
            }
            _ => false,
        }
    }

    /// Removes `key`, leaving a tombstone behind. May trigger a
    /// same-capacity rehash if tombstones have come to dominate live
    /// entries (see module docs).
    pub fn remove(&mut self, key: &K) -> Option<V>
    where
        K: Hash + Eq,
    {
        match self.find(key) {
            Slot::Occupied(idx) => Some(self.erase(idx)),
            Slot::Vacant { .. } => None,
        }
    }

    /// Removes `key` only if its current value equals `expected`.
    pub fn remove_if(&mut self, key: &K, expected: &V) -> bool
    where
        K: Hash + Eq,
        V: PartialEq,
    {
        match self.find(key) {
            Slot::Occupied(idx) if self.values[idx].as_ref() == Some(expected) => {
                self.erase(idx);
                true
            }
            _ => false,
        }
    }

    /// Like [`HashSmithMap::remove`], but immediately follows with a
    /// same-capacity rehash so that the table carries zero tombstones
    /// afterward. Useful for benchmarks and tests that want a
    /// tombstone-free, predictable table state.
    pub fn remove_without_tombstone(&mut self, key: &K) -> Option<V>
    where
        K: Hash + Eq,
    {
        let removed = self.remove(key);
        if removed.is_some() {
            let capacity = self.capacity();
            self.rebuild(capacity);
        }
        removed
    }

    /// Inserts or updates `key` via `f`, which receives the current value
    /// (if any) and returns the value to store, or `None` to remove the
    /// entry.
    pub fn compute<F>(&mut self, key: K, f: F) -> Option<&V>
    where
        K: Hash + Eq,
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        self.reserve_for_insert(1);
        match self.find(&key) {
            Slot::Occupied(idx) => {
                let outcome = f(self.values[idx].as_ref());
                match outcome {
                    Some(v) => {
                        self.values[idx] = Some(v);
                        self.values[idx].as_ref()
                    }
                    None => {
                        self.erase(idx);
                        None
                    }
                }
            }
            Slot::Vacant { idx, h2 } => match f(None) {
                Some(v) => {
                    self.write_vacant(idx, h2, key, v);
                    self.values[idx].as_ref()
                }
                None => None,
            },
        }
    }

    /// Updates `key`'s value via `f` only if it is already present.
    pub fn compute_if_present<F>(&mut self, key: &K, f: F) -> Option<&V>
    where
        K: Hash + Eq,
        F: FnOnce(&V) -> Option<V>,
    {
        match self.find(key) {
            Slot::Occupied(idx) => {
                let current = self.values[idx].as_ref().expect("occupied slot has a value");
                match f(current) {
                    Some(v) => {
                        self.values[idx] = Some(v);
                        self.values[idx].as_ref()
                    }
                    None => {
                        self.erase(idx);
                        None
                    }
                }
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Inserts `key => f()` only if `key` is absent, returning the
    /// (possibly freshly inserted) value either way.
    pub fn compute_if_absent<F>(&mut self, key: K, f: F) -> &V
    where
        K: Hash + Eq,
        F: FnOnce() -> V,
    {
        self.reserve_for_insert(1);
        match self.find(&key) {
            Slot::Occupied(idx) => self.values[idx].as_ref().expect("occupied slot has a value"),
            Slot::Vacant { idx, h2 } => {
                self.write_vacant(idx, h2, key, f());
                self.values[idx].as_ref().expect("just inserted")
            }
        }
    }

    /// Inserts every pair from `iter`, reusing tombstones where possible
    /// to avoid a resize that a plain per-key `put` loop would otherwise
    /// trigger early.
    pub fn put_all<I>(&mut self, iter: I)
    where
        K: Hash + Eq,
        I: IntoIterator<Item = (K, V)>,
    {
        let iter = iter.into_iter();
        let (lower_bound, _) = iter.size_hint();
        if lower_bound > 0 {
            let reusable = lower_bound.saturating_sub(self.tombstones);
            let projected = self.size + self.tombstones + reusable;
            self.ensure_capacity_for(projected);
        }
        for (key, value) in iter {
            self.put(key, value);
        }
    }

    /// Removes every entry, keeping the current capacity.
    pub fn clear(&mut self) {
        self.control.iter_mut().for_each(|c| *c = control::EMPTY);
        self.keys.iter_mut().for_each(|k| *k = None);
        self.values.iter_mut().for_each(|v| *v = None);
        self.size = 0;
        self.tombstones = 0;
    }

    /// Keeps only the entries for which `f` returns `true`.
    ///
    /// A dropped entry can trigger a same-capacity tombstone rehash
    /// mid-scan; when that happens the backing arrays are replaced but
    /// capacity is unchanged, so the scan index stays valid — it may just
    /// revisit slots in a different order than it started with, which is
    /// harmless because this engine makes no iteration-order guarantee.
    pub fn retain<F>(&mut self, mut f: F)
    where
        K: Hash + Eq,
        F: FnMut(&K, &V) -> bool,
    {
        let mut idx = 0;
        while idx < self.capacity() {
            if control::is_full(self.control[idx]) {
                let keep = f(
                    self.keys[idx].as_ref().expect("FULL slot has a key"),
                    self.values[idx].as_ref().expect("FULL slot has a value"),
                );
                if !keep {
                    self.erase(idx);
                }
            }
            idx += 1;
        }
    }

    /// Borrowing iterator over `(&K, &V)` pairs in array order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { control: &self.control, keys: &self.keys, values: &self.values, index: 0 }
    }

    /// Borrowing iterator over keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Borrowing iterator over values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    fn write_vacant(&mut self, idx: usize, h2: u8, key: K, value: V) {
        let was_deleted = control::is_deleted(self.control[idx]);
        self.control[idx] = control::full(h2);
        self.keys[idx] = Some(key);
        self.values[idx] = Some(value);
        self.size += 1;
        if was_deleted {
            self.tombstones -= 1;
        }
    }

    fn erase(&mut self, idx: usize) -> V {
        self.control[idx] = control::DELETED;
        self.keys[idx] = None;
        let value = self.values[idx].take().expect("erased slot had no value");
        self.size -= 1;
        self.tombstones += 1;
        self.maybe_rehash_for_tombstones();
        value
    }

    fn reserve_for_insert(&mut self, additional: usize) {
        let projected = self.size + self.tombstones + additional;
        self.ensure_capacity_for(projected);
    }

    fn ensure_capacity_for(&mut self, projected: usize) {
        let mut capacity = self.capacity();
        while projected > max_load_for(capacity, self.load_factor) {
            capacity *= 2;
        }
        if capacity != self.capacity() {
            self.rebuild(capacity);
            tracing::debug!(
                new_capacity = capacity,
                size = self.size,
                "hashsmith: grew single-threaded table"
            );
        }
    }

    fn maybe_rehash_for_tombstones(&mut self) {
        if self.tombstones > self.size / 2 && self.size + self.tombstones >= self.max_load {
            let capacity = self.capacity();
            self.rebuild(capacity);
            tracing::debug!(
                capacity,
                tombstones = self.tombstones,
                "hashsmith: tombstone-dominance rehash"
            );
        }
    }

    /// Rebuilds the table at `new_capacity`, reinserting every live entry
    /// into fresh, EMPTY-initialized arrays and resetting tombstones to
    /// zero. Used both for growth (`new_capacity` doubled) and for
    /// same-capacity tombstone cleanup (`new_capacity` unchanged) — since
    /// the destination starts empty, reinsertion never needs Robin-Hood
    /// shifting or eviction.
    fn rebuild(&mut self, new_capacity: usize)
    where
        K: Hash + Eq,
    {
        let old_capacity = self.capacity();
        let new_group_mask = new_capacity / WIDTH - 1;
        let mut new_control = vec![control::EMPTY; new_capacity];
        let mut new_keys: Vec<Option<K>> = (0..new_capacity).map(|_| None).collect();
        let mut new_values: Vec<Option<V>> = (0..new_capacity).map(|_| None).collect();

        for idx in 0..old_capacity {
            if !control::is_full(self.control[idx]) {
                continue;
            }
            let key = self.keys[idx].take().expect("FULL slot has a key");
            let value = self.values[idx].take().expect("FULL slot has a value");
            let (h1, h2) = split_hash(&key, &self.hasher);
            let mut g = h1 & new_group_mask;
            let mut step = 0usize;
            loop {
                let start = g * WIDTH;
                let word = group::load(&new_control[start..start + WIDTH]);
                let empties = group::empty_mask(word);
                if empties != 0 {
                    let slot = start + empties.trailing_zeros() as usize;
                    new_control[slot] = control::full(h2);
                    new_keys[slot] = Some(key);
                    new_values[slot] = Some(value);
                    break;
                }
                step += 1;
                g = (g + step) & new_group_mask;
            }
        }

        self.control = new_control;
        self.keys = new_keys;
        self.values = new_values;
        self.group_mask = new_group_mask;
        self.tombstones = 0;
        self.max_load = max_load_for(new_capacity, self.load_factor);
    }
}

impl<K, V, S: BuildHasher> HashSmithView<K, V> for HashSmithMap<K, V, S> {
    fn get_cloned(&self, key: &K) -> Option<V>
    where
        K: Hash + Eq,
        V: Clone,
    {
        self.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.size
    }

    fn contains_key(&self, key: &K) -> bool {
        matches!(self.find(key), Slot::Occupied(_))
    }
}

fn max_load_for(capacity: usize, load_factor: f64) -> usize {
    ((capacity as f64) * load_factor).floor() as usize
}

/// Rounds a requested capacity up to a power of two of at least 8 slots.
/// This sizes the raw table directly; it does not grow further to guarantee
/// `max_load` can hold `entries` (see `with_capacity`'s doc comment).
fn capacity_for_entries(entries: usize) -> Result<usize, MapError> {
    map::round_up_capacity(entries)
}

/// Borrowing iterator over `(&K, &V)` pairs, in control-array order.
pub struct Iter<'a, K, V> {
    control: &'a [u8],
    keys: &'a [Option<K>],
    values: &'a [Option<V>],
    index: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.control.len() {
            let idx = self.index;
            self.index += 1;
            if control::is_full(self.control[idx]) {
                return Some((
                    self.keys[idx].as_ref().expect("FULL slot has a key"),
                    self.values[idx].as_ref().expect("FULL slot has a value"),
                ));
            }
        }
        None
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashSmithMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Consuming iterator over `(K, V)` pairs.
pub struct IntoIter<K, V> {
    control: Vec<u8>,
    keys: Vec<Option<K>>,
    values: Vec<Option<V>>,
    index: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.control.len() {
            let idx = self.index;
            self.index += 1;
            if control::is_full(self.control[idx]) {
                let key = self.keys[idx].take().expect("FULL slot has a key");
                let value = self.values[idx].take().expect("FULL slot has a value");
                return Some((key, value));
            }
        }
        None
    }
}

impl<K, V, S> IntoIterator for HashSmithMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { control: self.control, keys: self.keys, values: self.values, index: 0 }
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for HashSmithMap<K, V, RandomState> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let mut map = Self::with_capacity(lower);
        map.put_all(iter);
        map
    }
}
