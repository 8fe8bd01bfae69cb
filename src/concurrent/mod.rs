//! Lock-free cooperative-resize engine — component E.
//!
//! [`ConcurrentHashSmithMap`] shares the control-byte/group layout of
//! [`crate::single::HashSmithMap`] but never blocks a caller on a mutex.
//! Every write funnels through [`ConcurrentHashSmithMap::put_if_match`], the
//! same unified primitive the single-threaded engine's whole public surface
//! is built from. Deletion never writes a DELETED control byte (that would
//! race the resize copier's freeze step); instead a deleted value cell holds
//! [`ValueSlot::Tombstone`].
//!
//! ## Publication
//!
//! A control byte becomes FULL(H2) only after the key cell and the value
//! cell are both published (`EMPTY -> key -> value -> FULL`, each step a
//! CAS). A reader that observes FULL may therefore always dereference the
//! key cell and, from there, the value cell.
//!
//! ## Resize
//!
//! One thread wins the right to grow the table by CAS-claiming
//! `new_table`; everyone else spin-waits on that same field. The winner
//! freezes each old key cell (tagging it MOVED), boxes each old value cell
//! (tagging it [`ValueSlot::Prime`]) so in-flight writers abandon it and
//! retry against the new table, reinstalls a copy in the successor table,
//! and finally marks the old cell [`ValueSlot::TombstonePrime`]. The
//! original algorithm this is modeled on shares the *same* boxed value
//! across both tables by reference; Rust's ownership model does not allow
//! one `Box` to be referenced from two independent atomic cells, so the
//! copy step here clones the key and value instead. This is the one
//! deliberate divergence from the reference algorithm (see `DESIGN.md`).

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicIsize, AtomicU8, Ordering};

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::{Backoff, CachePadded};

use crate::control;
use crate::group::{self, WIDTH};
use crate::hash::split_hash;
use crate::map::{self, HashSmithView, MapError, DEFAULT_LOAD_FACTOR};

#[cfg(test)]
mod tests;

/// Tag on a key cell's pointer meaning "frozen for copy; the key that used
/// to live here has moved to the successor table".
const MOVED_TAG: usize = 1;

/// Number of independent counters backing the approximate live-entry
/// count, so concurrent inserts from different threads don't contend on
/// one cache line.
const STRIPES: usize = 8;

/// A value cell's logical state. Every transition installs a fresh
/// allocation via CAS; the lock-free engine never mutates a value cell's
/// contents in place.
enum ValueSlot<V> {
    /// A live user value.
    Value(V),
    /// Logically deleted; the slot is eligible for reuse by a future
    /// insert of the *same* key only in the sense that `put` will CAS
    /// straight over the tombstone (the control byte and key cell are
    /// never reset, so a different key can never reuse this slot).
    Tombstone,
    /// Frozen during resize: a copier has claimed this value for transfer
    /// to the successor table. Any writer that observes this must retry
    /// against the (possibly new) current table.
    Prime(V),
    /// Frozen and confirmed absent, or frozen and already copied out.
    TombstonePrime,
}

impl<V> ValueSlot<V> {
    fn is_live(&self) -> bool {
        matches!(self, ValueSlot::Value(_))
    }
}

/// What a caller wants the prior value to satisfy before a write commits —
/// the unified mutator's `expectedOld` parameter.
enum Expected<'a, V> {
    /// Unconditional put (`NO_MATCH_OLD`).
    Any,
    /// Update only if a live value is already present (`MATCH_ANY`).
    MustExist,
    /// Insert only if absent (the `null` sentinel).
    Absent,
    /// Conditional on value equality.
    Exactly(&'a V),
}

/// The value a caller wants installed — either a user value or the
/// `DELETE` token.
enum NewValue<V> {
    Put(V),
    Delete,
}

/// The result of a single `expected`-gated write attempt, once it has
/// resolved (as opposed to needing a retry or a resize).
///
/// `Option<V>`-returning callers (`put`, `put_if_absent`, `replace`,
/// `remove`) only care about the carried value and can collapse either
/// variant into it with [`Outcome::into_option`]. `bool`-returning callers
/// (`replace_exact`, `remove_if`) need the tag itself: a CAS whose
/// `expected` did not match the observed value must report failure even
/// when that observed value is `Some(_)`.
enum Outcome<V> {
    /// The write committed. Carries the value that was replaced or removed,
    /// or `None` for a fresh insert.
    Applied(Option<V>),
    /// `expected` did not hold, so nothing was written. Carries the value
    /// that was observed instead, if any.
    Unmet(Option<V>),
}

impl<V> Outcome<V> {
    fn into_option(self) -> Option<V> {
        match self {
            Outcome::Applied(v) | Outcome::Unmet(v) => v,
        }
    }

    fn applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

enum Attempt<V> {
    Done(Outcome<V>),
    Retry,
    NeedResize,
}

/// One generation of slot arrays, plus the forward pointer used during a
/// cooperative resize. `new_table` is null with tag 0 when no resize is in
/// progress, null with tag 1 once a winner has claimed the right to
/// resize but before the successor is allocated, and non-null once the
/// successor is ready — readers only ever check "is the pointer part
/// null", so the claimed-but-not-ready state is indistinguishable from "no
/// resize yet" to a spinning waiter except that it will resolve.
struct Table<K, V> {
    control: Vec<AtomicU8>,
    keys: Vec<Atomic<K>>,
    values: Vec<Atomic<ValueSlot<V>>>,
    group_mask: usize,
    capacity: usize,
    max_load: usize,
    new_table: Atomic<Table<K, V>>,
}

impl<K, V> Table<K, V> {
    fn new(capacity: usize, load_factor: f64) -> Self {
        debug_assert!(capacity >= WIDTH && capacity.is_power_of_two());
        let mut control = Vec::with_capacity(capacity);
        control.resize_with(capacity, || AtomicU8::new(control::EMPTY));
        let mut keys = Vec::with_capacity(capacity);
        keys.resize_with(capacity, Atomic::null);
        let mut values = Vec::with_capacity(capacity);
        values.resize_with(capacity, Atomic::null);
        Table {
            control,
            keys,
            values,
            group_mask: capacity / WIDTH - 1,
            capacity,
            max_load: ((capacity as f64) * load_factor).floor() as usize,
            new_table: Atomic::null(),
        }
    }

    fn groups(&self) -> usize {
        self.capacity / WIDTH
    }

    fn load_group_word(&self, group: usize) -> u64 {
        let start = group * WIDTH;
        let mut bytes = [0u8; WIDTH];
        for (lane, slot) in bytes.iter_mut().enumerate() {
            *slot = self.control[start + lane].load(Ordering::Acquire);
        }
        u64::from_ne_bytes(bytes)
    }

    fn is_resizing(&self, guard: &Guard) -> bool {
        !self.new_table.load(Ordering::Acquire, guard).is_null()
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        // A table generation is only ever retired (and therefore dropped)
        // once no guard predating its retirement can still be pinned, so
        // reconstructing owned boxes from its cell pointers here is sound.
        let guard = unsafe { epoch::unprotected() };
        for key in self.keys.drain(..) {
            let shared = key.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                unsafe { drop(shared.into_owned()) };
            }
        }
        for value in self.values.drain(..) {
            let shared = value.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                unsafe { drop(shared.into_owned()) };
            }
        }
    }
}

/// A striped approximate counter: `size()` sums all stripes, each write
/// touches exactly one. Never exact under concurrent mutation mid-read,
/// which is why the map documents `len` as approximate.
struct StripedCounter {
    stripes: Vec<CachePadded<AtomicIsize>>,
}

impl StripedCounter {
    fn new() -> Self {
        let stripes = (0..STRIPES).map(|_| CachePadded::new(AtomicIsize::new(0))).collect();
        StripedCounter { stripes }
    }

    fn stripe(&self) -> &CachePadded<AtomicIsize> {
        let id = std::thread::current().id();
        let hashed = {
            use std::hash::Hasher;
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            id.hash(&mut hasher);
            hasher.finish()
        };
        &self.stripes[(hashed as usize) % STRIPES]
    }

    fn add(&self, delta: isize) {
        self.stripe().fetch_add(delta, Ordering::Relaxed);
    }

    fn sum(&self) -> isize {
        self.stripes.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }
}

/// A lock-free, open-addressing hash table with cooperative resize.
///
/// Requires `K: Clone` and `V: Clone`: the resize copier installs a cloned
/// copy of each live entry into the successor table rather than moving a
/// shared reference, since Rust does not allow one allocation to be
/// referenced from two independent atomic cells (see the module docs).
pub struct ConcurrentHashSmithMap<K, V, S = RandomState> {
    root: Atomic<Table<K, V>>,
    hasher: S,
    size: StripedCounter,
    load_factor: f64,
}

impl<K, V> Default for ConcurrentHashSmithMap<K, V, RandomState>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentHashSmithMap<K, V, RandomState>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
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

impl<K, V, S> ConcurrentHashSmithMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
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
        let table_capacity = map::round_up_capacity(capacity)?;
        Ok(ConcurrentHashSmithMap {
            root: Atomic::new(Table::new(table_capacity, load_factor)),
            hasher,
            size: StripedCounter::new(),
            load_factor,
        })
    }

    fn pin(&self) -> Guard {
        epoch::pin()
    }

    fn current<'g>(&self, guard: &'g Guard) -> &'g Table<K, V> {
        unsafe { self.root.load(Ordering::Acquire, guard).deref() }
    }

    /// Approximate number of live entries, summed across the striped
    /// counters. May be briefly stale relative to a concurrently running
    /// insert or remove.
    pub fn len(&self) -> usize {
        self.size.sum().max(0) as usize
    }

    /// Whether the map currently holds no live entries (approximate, like
    /// [`ConcurrentHashSmithMap::len`]).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `key`, returning a clone of its value if a live entry
    /// exists.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.pin();
        let backoff = Backoff::new();
        loop {
            let table = self.current(&guard);
            match self.try_get(table, key, &guard) {
                Ok(result) => return result,
                Err(()) => {
                    backoff.spin();
                    continue;
                }
            }
        }
    }

    fn try_get(&self, table: &Table<K, V>, key: &K, guard: &Guard) -> Result<Option<V>, ()> {
        if table.is_resizing(guard) {
            return Err(());
        }
        let (h1, h2) = split_hash(key, &self.hasher);
        let groups = table.groups();
        let mut g = h1 & table.group_mask;
        let mut step = 0usize;

        for _ in 0..groups {
            let word = table.load_group_word(g);
            let mut matches = group::eq_mask(word, h2);
            while matches != 0 {
                let lane = matches.trailing_zeros() as usize;
                matches &= matches - 1;
                let idx = g * WIDTH + lane;

                let key_shared = table.keys[idx].load(Ordering::Acquire, guard);
                if key_shared.tag() == MOVED_TAG {
                    return Err(());
                }
                if key_shared.is_null() {
                    continue;
                }
                if unsafe { key_shared.deref() } != key {
                    continue;
                }

                let value_shared = table.values[idx].load(Ordering::Acquire, guard);
                return match unsafe { value_shared.as_ref() } {
                    None | Some(ValueSlot::Tombstone) => Ok(None),
                    Some(ValueSlot::Value(v)) => Ok(Some(v.clone())),
                    Some(ValueSlot::Prime(_)) | Some(ValueSlot::TombstonePrime) => Err(()),
                };
            }

            if group::empty_mask(word) != 0 {
                return Ok(None);
            }
            step += 1;
            g = (g + step) & table.group_mask;
        }
        Ok(None)
    }

    /// Whether `key` is present with a live value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Whether any live entry equals `value`.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.snapshot().into_iter().any(|(_, v)| &v == value)
    }

    /// Unconditionally inserts `key => value`, returning the prior value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.put_if_match(key, NewValue::Put(value), Expected::Any).into_option()
    }

    /// Inserts `key => value` only if absent.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        self.put_if_match(key, NewValue::Put(value), Expected::Absent).into_option()
    }

    /// Updates `key`'s value only if it is already present.
    pub fn replace(&self, key: K, value: V) -> Option<V> {
        self.put_if_match(key, NewValue::Put(value), Expected::MustExist).into_option()
    }

    /// Updates `key`'s value to `new` only if its current value equals
    /// `old`. Returns whether the swap actually committed.
    pub fn replace_exact(&self, key: K, old: &V, new: V) -> bool
    where
        V: PartialEq,
    {
        self.put_if_match_ref(&key, NewValue::Put(new), Expected::Exactly(old)).applied()
    }

    /// Removes `key`, returning its prior value if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.put_if_match_ref(key, NewValue::Delete, Expected::Any).into_option()
    }

    /// Removes `key` only if its current value equals `expected`. Returns
    /// whether the removal actually committed.
    pub fn remove_if(&self, key: &K, expected: &V) -> bool
    where
        V: PartialEq,
    {
        self.put_if_match_ref(key, NewValue::Delete, Expected::Exactly(expected)).applied()
    }

    fn put_if_match(&self, key: K, new_val: NewValue<V>, expected: Expected<'_, V>) -> Outcome<V>
    where
        V: PartialEq,
    {
        self.put_if_match_ref(&key, new_val, expected)
    }

    fn put_if_match_ref(&self, key: &K, new_val: NewValue<V>, expected: Expected<'_, V>) -> Outcome<V>
    where
        V: PartialEq,
    {
        let guard = self.pin();
        loop {
            let table = self.current(&guard);
            match self.try_put_if_match(table, key, &new_val, &expected, &guard) {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry => continue,
                Attempt::NeedResize => {
                    self.resize_or_wait(table, &guard);
                    continue;
                }
            }
        }
    }

    fn try_put_if_match(
        &self,
        table: &Table<K, V>,
        key: &K,
        new_val: &NewValue<V>,
        expected: &Expected<'_, V>,
        guard: &Guard,
    ) -> Attempt<V>
    where
        V: PartialEq,
    {
        if table.is_resizing(guard) {
            return Attempt::Retry;
        }

        let (h1, h2) = split_hash(key, &self.hasher);
        let groups = table.groups();
        let mut g = h1 & table.group_mask;
        let mut step = 0usize;

        for _ in 0..groups {
            let word = table.load_group_word(g);

            let mut matches = group::eq_mask(word, h2);
            while matches != 0 {
                let lane = matches.trailing_zeros() as usize;
                matches &= matches - 1;
                let idx = g * WIDTH + lane;

                let key_shared = table.keys[idx].load(Ordering::Acquire, guard);
                if key_shared.tag() == MOVED_TAG {
                    return Attempt::Retry;
                }
                if key_shared.is_null() {
                    continue;
                }
                if unsafe { key_shared.deref() } != key {
                    continue;
                }

                return self.commit_value(table, idx, new_val, expected, guard);
            }

            if group::empty_mask(word) != 0 {
                if matches!(new_val, NewValue::Delete) {
                    return Attempt::Done(Outcome::Unmet(None));
                }
                if !matches!(expected, Expected::Any | Expected::Absent) {
                    // MustExist and Exactly both require a live value to
                    // condition on; the key is absent, so neither can ever
                    // be satisfied here.
                    return Attempt::Done(Outcome::Unmet(None));
                }
                return self.install_new_entry(table, g, word, key, h2, new_val, guard);
            }

            step += 1;
            g = (g + step) & table.group_mask;
        }

        Attempt::NeedResize
    }

    fn commit_value(
        &self,
        table: &Table<K, V>,
        idx: usize,
        new_val: &NewValue<V>,
        expected: &Expected<'_, V>,
        guard: &Guard,
    ) -> Attempt<V>
    where
        V: PartialEq,
    {
        loop {
            if table.is_resizing(guard) {
                return Attempt::Retry;
            }
            let current_shared = table.values[idx].load(Ordering::Acquire, guard);
            let current = unsafe { current_shared.as_ref() };

            match current {
                Some(ValueSlot::Prime(_)) | Some(ValueSlot::TombstonePrime) => return Attempt::Retry,
                None | Some(ValueSlot::Tombstone) => {
                    let allowed = matches!(expected, Expected::Any | Expected::Absent);
                    if matches!(new_val, NewValue::Delete) || !allowed {
                        return Attempt::Done(Outcome::Unmet(None));
                    }
                    let NewValue::Put(v) = new_val else { unreachable!() };
                    let installed = Owned::new(ValueSlot::Value(v.clone()));
                    match table.values[idx].compare_exchange(
                        current_shared,
                        installed,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            self.size.add(1);
                            if !current_shared.is_null() {
                                unsafe { guard.defer_destroy(current_shared) };
                            }
                            return Attempt::Done(Outcome::Applied(None));
                        }
                        Err(_) => continue,
                    }
                }
                Some(ValueSlot::Value(existing)) => {
                    let matches_expected = match expected {
                        Expected::Any | Expected::MustExist => true,
                        Expected::Absent => false,
                        Expected::Exactly(want) => *want == existing,
                    };
                    if !matches_expected {
                        return Attempt::Done(Outcome::Unmet(Some(existing.clone())));
                    }
                    let prior = existing.clone();
                    let installed = match new_val {
                        NewValue::Put(v) => Owned::new(ValueSlot::Value(v.clone())),
                        NewValue::Delete => Owned::new(ValueSlot::Tombstone),
                    };
                    match table.values[idx].compare_exchange(
                        current_shared,
                        installed,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            if matches!(new_val, NewValue::Delete) {
                                self.size.add(-1);
                            }
                            unsafe { guard.defer_destroy(current_shared) };
                            return Attempt::Done(Outcome::Applied(Some(prior)));
                        }
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    fn install_new_entry(
        &self,
        table: &Table<K, V>,
        group_idx: usize,
        word: u64,
        key: &K,
        h2: u8,
        new_val: &NewValue<V>,
        guard: &Guard,
    ) -> Attempt<V> {
        let empties = group::empty_mask(word);
        let lane = empties.trailing_zeros() as usize;
        let idx = group_idx * WIDTH + lane;
        let NewValue::Put(value) = new_val else {
            // try_put_if_match never calls this with a delete; kept as a
            // defensive match since Attempt must still resolve.
            return Attempt::Done(Outcome::Unmet(None));
        };

        match table.keys[idx].compare_exchange(
            Shared::null(),
            Owned::new(key.clone()),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {}
            Err(_) => return Attempt::Retry,
        }

        if table.is_resizing(guard) {
            return Attempt::Retry;
        }

        match table.values[idx].compare_exchange(
            Shared::null(),
            Owned::new(ValueSlot::Value(value.clone())),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {}
            Err(_) => return Attempt::Retry,
        }

        if table.is_resizing(guard) {
            return Attempt::Retry;
        }

        match table.control[idx].compare_exchange(
            control::EMPTY,
            control::full(h2),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.size.add(1);
                Attempt::Done(Outcome::Applied(None))
            }
            Err(_) => Attempt::Retry,
        }
    }

    /// Either wins the right to grow `table` and performs the copy, or
    /// spin-waits for whoever did.
    fn resize_or_wait(&self, table: &Table<K, V>, guard: &Guard) {
        let reservation = Shared::<Table<K, V>>::null().with_tag(1);
        match table.new_table.compare_exchange(
            Shared::null(),
            reservation,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(claimed) => {
                let successor = Table::new(table.capacity * 2, self.load_factor);
                let successor_owned = Owned::new(successor);
                let successor_shared = match table.new_table.compare_exchange(
                    claimed,
                    successor_owned,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                ) {
                    Ok(shared) => shared,
                    Err(_) => unreachable!("only the resize winner writes new_table after claiming it"),
                };
                let successor_ref = unsafe { successor_shared.deref() };
                self.copy_all_slots(table, successor_ref, guard);

                let current_root = self.root.load(Ordering::Acquire, guard);
                if std::ptr::eq(unsafe { current_root.deref() as *const Table<K, V> }, table) {
                    if self
                        .root
                        .compare_exchange(
                            current_root,
                            successor_shared,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            guard,
                        )
                        .is_ok()
                    {
                        unsafe { guard.defer_destroy(current_root) };
                    }
                }
                tracing::debug!(new_capacity = successor_ref.capacity, "hashsmith: grew concurrent table");
            }
            Err(_) => {
                let backoff = Backoff::new();
                while table.new_table.load(Ordering::Acquire, guard).is_null() {
                    backoff.spin();
                }
            }
        }
    }

    /// Freezes, boxes, and copies every live slot of `old` into `new`.
    fn copy_all_slots(&self, old: &Table<K, V>, new: &Table<K, V>, guard: &Guard) {
        for idx in 0..old.capacity {
            // Freeze the key cell so no future writer claims this slot.
            let key_shared = loop {
                let current = old.keys[idx].load(Ordering::Acquire, guard);
                if current.tag() == MOVED_TAG {
                    break current;
                }
                if current.is_null() {
                    // Never written; mark moved directly so install can't race it.
                    match old.keys[idx].compare_exchange(
                        current,
                        Shared::null().with_tag(MOVED_TAG),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(moved) => break moved,
                        Err(_) => continue,
                    }
                }
                match old.keys[idx].compare_exchange(
                    current,
                    current.with_tag(MOVED_TAG),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                ) {
                    Ok(moved) => break moved,
                    Err(_) => continue,
                }
            };

            if key_shared.is_null() {
                continue;
            }
            let key = unsafe { key_shared.deref() }.clone();

            // Box the value so in-flight writers abandon it.
            let boxed_value = loop {
                let current = old.values[idx].load(Ordering::Acquire, guard);
                match unsafe { current.as_ref() } {
                    None | Some(ValueSlot::Tombstone) => {
                        match old.values[idx].compare_exchange(
                            current,
                            Owned::new(ValueSlot::TombstonePrime),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            guard,
                        ) {
                            Ok(installed) => break installed,
                            Err(_) => continue,
                        }
                    }
                    Some(ValueSlot::Prime(_)) | Some(ValueSlot::TombstonePrime) => break current,
                    Some(ValueSlot::Value(v)) => {
                        let v = v.clone();
                        match old.values[idx].compare_exchange(
                            current,
                            Owned::new(ValueSlot::Prime(v)),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            guard,
                        ) {
                            Ok(installed) => break installed,
                            Err(_) => continue,
                        }
                    }
                }
            };

            let value = match unsafe { boxed_value.as_ref() } {
                Some(ValueSlot::Prime(v)) => Some(v.clone()),
                _ => None,
            };

            if let Some(value) = value {
                self.install_into_fresh_table(new, key, value, guard);
            }

            // Finalize: the copy (if any) is now durably in `new`; retire
            // the old slot's boxed value.
            let final_box = Owned::new(ValueSlot::TombstonePrime);
            if old.values[idx]
                .compare_exchange(boxed_value, final_box, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                unsafe { guard.defer_destroy(boxed_value) };
            }
        }
    }

    /// Inserts `key => value` into a pristine successor table. Never
    /// conflicts, since the successor has no concurrent writers other
    /// than the resize copier itself until it is published as root.
    fn install_into_fresh_table(&self, table: &Table<K, V>, key: K, value: V, guard: &Guard) {
        let (h1, h2) = split_hash(&key, &self.hasher);
        let mut g = h1 & table.group_mask;
        let mut step = 0usize;
        loop {
            let word = table.load_group_word(g);
            let empties = group::empty_mask(word);
            if empties != 0 {
                let idx = g * WIDTH + empties.trailing_zeros() as usize;
                table.keys[idx].store(Owned::new(key), Ordering::Release);
                table.values[idx].store(Owned::new(ValueSlot::Value(value)), Ordering::Release);
                table.control[idx].store(control::full(h2), Ordering::Release);
                let _ = guard;
                return;
            }
            step += 1;
            g = (g + step) & table.group_mask;
        }
    }

    /// Builds a stable point-in-time snapshot of every live `(key, value)`
    /// pair. Size-count queries use the approximate striped counter
    /// instead of this snapshot's length.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let guard = self.pin();
        let table = self.current(&guard);
        let mut out = Vec::new();
        for idx in 0..table.capacity {
            if !control::is_full(table.control[idx].load(Ordering::Acquire)) {
                continue;
            }
            let key_shared = table.keys[idx].load(Ordering::Acquire, &guard);
            if key_shared.is_null() || key_shared.tag() == MOVED_TAG {
                continue;
            }
            let value_shared = table.values[idx].load(Ordering::Acquire, &guard);
            let value = match unsafe { value_shared.as_ref() } {
                Some(ValueSlot::Value(v)) => Some(v.clone()),
                Some(ValueSlot::Prime(v)) => Some(v.clone()),
                _ => None,
            };
            if let Some(value) = value {
                out.push((unsafe { key_shared.deref() }.clone(), value));
            }
        }
        out
    }
}

impl<K, V, S> HashSmithView<K, V> for ConcurrentHashSmithMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get(key)
    }

    fn len(&self) -> usize {
        ConcurrentHashSmithMap::len(self)
    }

    fn contains_key(&self, key: &K) -> bool {
        ConcurrentHashSmithMap::contains_key(self, key)
    }
}

impl<K, V, S> Drop for ConcurrentHashSmithMap<K, V, S> {
    fn drop(&mut self) {
        // Single-owner drop: no concurrent access is possible once we have
        // `&mut self`, so reclaiming the current table directly (rather
        // than deferring, which would leak under an unprotected guard) is
        // sound.
        let guard = unsafe { epoch::unprotected() };
        let table = self.root.load(Ordering::Relaxed, guard);
        if !table.is_null() {
            unsafe { drop(table.into_owned()) };
        }
    }
}
