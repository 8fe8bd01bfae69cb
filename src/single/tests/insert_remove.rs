use crate::single::HashSmithMap;

#[test]
fn put_returns_prior_value_on_overwrite() {
    let mut map = HashSmithMap::new();
    assert_eq!(map.put("a", 1), None);
    assert_eq!(map.put("a", 2), Some(1));
    assert_eq!(map.get(&"a"), Some(&2));
    assert_eq!(map.len(), 1);
}

#[test]
fn put_if_absent_never_overwrites() {
    let mut map = HashSmithMap::new();
    map.put_if_absent("a", 1);
    assert_eq!(map.put_if_absent("a", 2), Some(&1));
    assert_eq!(map.get(&"a"), Some(&1));
}

#[test]
fn remove_returns_value_and_drops_membership() {
    let mut map = HashSmithMap::new();
    map.put("a", 1);
    assert_eq!(map.remove(&"a"), Some(1));
    assert_eq!(map.remove(&"a"), None);
    assert!(!map.contains_key(&"a"));
    assert_eq!(map.len(), 0);
}

#[test]
fn remove_if_only_removes_on_matching_value() {
    let mut map = HashSmithMap::new();
    map.put("a", 1);
    assert!(!map.remove_if(&"a", &2));
    assert_eq!(map.get(&"a"), Some(&1));
    assert!(map.remove_if(&"a", &1));
    assert_eq!(map.get(&"a"), None);
}

#[test]
fn replace_exact_is_a_single_threaded_compare_and_swap() {
    let mut map = HashSmithMap::new();
    map.put("a", 1);
    assert!(!map.replace_exact(&"a", &99, 2));
    assert_eq!(map.get(&"a"), Some(&1));
    assert!(map.replace_exact(&"a", &1, 2));
    assert_eq!(map.get(&"a"), Some(&2));
}

#[test]
fn replace_never_inserts_absent_keys() {
    let mut map: HashSmithMap<&str, i32> = HashSmithMap::new();
    assert_eq!(map.replace(&"a", 1), None);
    assert!(!map.contains_key(&"a"));
}

#[test]
fn compute_inserts_updates_and_removes() {
    let mut map = HashSmithMap::new();
    map.compute("a", |_| Some(1));
    assert_eq!(map.get(&"a"), Some(&1));
    map.compute("a", |v| v.map(|n| n + 1));
    assert_eq!(map.get(&"a"), Some(&2));
    map.compute("a", |_| None);
    assert!(!map.contains_key(&"a"));
}

#[test]
fn compute_if_absent_only_runs_closure_when_missing() {
    let mut map = HashSmithMap::new();
    let mut calls = 0;
    map.compute_if_absent("a", || {
        calls += 1;
        1
    });
    map.compute_if_absent("a", || {
        calls += 1;
        2
    });
    assert_eq!(calls, 1);
    assert_eq!(map.get(&"a"), Some(&1));
}

#[test]
fn contains_value_scans_live_entries_only() {
    let mut map = HashSmithMap::new();
    map.put("a", 1);
    map.put("b", 2);
    map.remove(&"a");
    assert!(!map.contains_value(&1));
    assert!(map.contains_value(&2));
}

#[test]
fn clear_empties_the_table_without_changing_capacity() {
    let mut map = HashSmithMap::new();
    for i in 0..20 {
        map.put(i, i * 2);
    }
    let capacity = map.capacity();
    map.clear();
    assert_eq!(map.len(), 0);
    assert_eq!(map.capacity(), capacity);
    assert!(!map.contains_key(&0));
}

#[test]
fn retain_drops_entries_failing_the_predicate() {
    let mut map = HashSmithMap::new();
    for i in 0..16 {
        map.put(i, i);
    }
    map.retain(|_, &v| v % 2 == 0);
    assert_eq!(map.len(), 8);
    for i in 0..16 {
        assert_eq!(map.contains_key(&i), i % 2 == 0);
    }
}

#[test]
fn iter_yields_every_live_pair_exactly_once() {
    let mut map = HashSmithMap::new();
    for i in 0..10 {
        map.put(i, i.to_string());
    }
    map.remove(&3);
    let mut seen: Vec<i32> = map.iter().map(|(&k, _)| k).collect();
    seen.sort_unstable();
    let mut expected: Vec<i32> = (0..10).filter(|&i| i != 3).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn from_iterator_builds_an_equivalent_table() {
    let pairs = vec![("a", 1), ("b", 2), ("c", 3)];
    let map: HashSmithMap<&str, i32> = pairs.into_iter().collect();
    assert_eq!(map.len(), 3);
    assert_eq!(map.get(&"b"), Some(&2));
}
