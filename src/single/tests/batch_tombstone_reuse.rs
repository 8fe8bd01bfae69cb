use crate::single::HashSmithMap;

#[test]
fn put_all_reuses_tombstones_instead_of_growing_unnecessarily() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(64);
    let capacity = map.capacity();

    for i in 0..40 {
        map.put(i, i);
    }
    for i in 0..40 {
        map.remove(&i);
    }

    // Same number of entries as were just vacated: should fit in the
    // tombstones left behind without forcing growth.
    map.put_all((1000..1040).map(|i| (i, i)));

    assert_eq!(map.capacity(), capacity, "batch insert should have reused tombstoned slots, not grown");
    assert_eq!(map.len(), 40);
    for i in 1000..1040 {
        assert_eq!(map.get(&i), Some(&i));
    }
}

#[test]
fn put_all_still_grows_when_demand_exceeds_reusable_tombstones() {
    let mut map: HashSmithMap<i32, i32> = HashSmithMap::with_capacity(8);
    let capacity = map.capacity();

    map.put_all((0..200).map(|i| (i, i)));

    assert!(map.capacity() > capacity);
    assert_eq!(map.len(), 200);
}
