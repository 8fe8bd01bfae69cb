//! Direct checks of the quantified invariants from the core specification
//! (P1-P6), using crate-internal access to the control/key arrays.

use crate::control;
use crate::hash::split_hash;
use crate::single::HashSmithMap;

/// P1: for every FULL slot, the low 7 bits of its control byte equal H2 of
/// the stored key.
#[test]
fn p1_fingerprint_consistency_holds_after_inserts_and_removes() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(64);
    for i in 0..50 {
        map.put(i, i);
    }
    for i in (0..50).step_by(4) {
        map.remove(&i);
    }
    for i in 50..80 {
        map.put(i, i);
    }

    for idx in 0..map.capacity() {
        if control::is_full(map.control[idx]) {
            let key = map.keys[idx].as_ref().expect("FULL slot has a key");
            let (_, expected_h2) = split_hash(key, &map.hasher);
            assert_eq!(map.control[idx] & 0x7F, expected_h2, "control byte at {idx} disagrees with H2(key)");
        }
    }
}

/// P2: after any sequence of puts/removes, `len()` equals the number of
/// FULL slots (the single-threaded engine has no value-cell tombstone, so
/// every FULL slot is by construction live).
#[test]
fn p2_size_accounting_matches_full_slot_count() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(32);
    for i in 0..20 {
        map.put(i, i);
    }
    for i in 0..7 {
        map.remove(&i);
    }
    for i in 100..105 {
        map.put(i, i);
    }

    let full_count = map.control.iter().filter(|&&c| control::is_full(c)).count();
    assert_eq!(map.len(), full_count);
}

/// P3: after every public operation, size + tombstones <= max_load.
#[test]
fn p3_bounded_load_holds_across_a_mixed_workload() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(16);
    for i in 0..200 {
        map.put(i, i);
        assert!(map.len() + map.tombstones() <= map.max_load, "violated after put({i})");
        if i % 3 == 0 {
            map.remove(&i);
            assert!(map.len() + map.tombstones() <= map.max_load, "violated after remove({i})");
        }
    }
}

/// P4: a sequence containing only removes never grows capacity (in this
/// core, capacity is strictly unchanged).
#[test]
fn p4_capacity_never_grows_under_remove_only_sequences() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(64);
    for i in 0..40 {
        map.put(i, i);
    }
    let capacity_before = map.capacity();
    for i in 0..40 {
        map.remove(&i);
        assert_eq!(map.capacity(), capacity_before, "capacity changed during a remove-only sequence");
    }
}

/// P5: every inserted (k, v) not subsequently removed or overwritten reads
/// back its value.
#[test]
fn p5_round_trip_holds_for_untouched_entries() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(64);
    for i in 0..50 {
        map.put(i, i * 11);
    }
    for i in (0..50).step_by(5) {
        map.remove(&i);
    }
    for i in 0..50 {
        if i % 5 != 0 {
            assert_eq!(map.get(&i), Some(&(i * 11)));
        }
    }
}

/// P6: `put(k, v); put(k, v)` is indistinguishable from a single `put(k, v)`
/// in size, contents, and tombstone count.
#[test]
fn p6_idempotent_put_leaves_the_table_unchanged() {
    let mut once: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(16);
    once.put(1, 10);
    once.put(2, 20);

    let mut twice: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(16);
    twice.put(1, 10);
    twice.put(2, 20);
    twice.put(2, 20);

    assert_eq!(once.len(), twice.len());
    assert_eq!(once.tombstones(), twice.tombstones());
    assert_eq!(once.get(&1), twice.get(&1));
    assert_eq!(once.get(&2), twice.get(&2));
}
