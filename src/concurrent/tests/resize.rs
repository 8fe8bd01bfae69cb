use crate::concurrent::ConcurrentHashSmithMap;

#[test]
fn growth_preserves_every_entry() {
    let map: ConcurrentHashSmithMap<i32, i32> = ConcurrentHashSmithMap::with_capacity(8);
    for i in 0..300 {
        map.put(i, i * i);
    }
    assert_eq!(map.len(), 300);
    for i in 0..300 {
        assert_eq!(map.get(&i), Some(i * i));
    }
}

#[test]
fn snapshot_reflects_live_entries_only() {
    let map: ConcurrentHashSmithMap<i32, i32> = ConcurrentHashSmithMap::with_capacity(8);
    for i in 0..50 {
        map.put(i, i);
    }
    for i in 0..10 {
        map.remove(&i);
    }
    let mut snapshot = map.snapshot();
    snapshot.sort_unstable();
    let mut expected: Vec<(i32, i32)> = (10..50).map(|i| (i, i)).collect();
    expected.sort_unstable();
    assert_eq!(snapshot, expected);
}

#[test]
fn invalid_load_factor_is_rejected() {
    let result = ConcurrentHashSmithMap::<i32, i32>::try_with_capacity_and_load_factor(
        16,
        0.0,
        std::collections::hash_map::RandomState::new(),
    );
    assert!(result.is_err());
}
