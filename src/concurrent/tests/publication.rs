use crate::concurrent::ConcurrentHashSmithMap;
use std::sync::Arc;
use std::thread;

#[test]
fn put_get_remove_round_trip() {
    let map = ConcurrentHashSmithMap::new();
    assert_eq!(map.put(1, "a".to_string()), None);
    assert_eq!(map.get(&1), Some("a".to_string()));
    assert_eq!(map.put(1, "b".to_string()), Some("a".to_string()));
    assert_eq!(map.remove(&1), Some("b".to_string()));
    assert_eq!(map.get(&1), None);
    assert_eq!(map.remove(&1), None);
}

#[test]
fn put_if_absent_never_overwrites() {
    let map = ConcurrentHashSmithMap::new();
    assert_eq!(map.put_if_absent(1, 10), None);
    assert_eq!(map.put_if_absent(1, 20), Some(10));
    assert_eq!(map.get(&1), Some(10));
}

#[test]
fn replace_exact_is_a_compare_and_swap() {
    let map = ConcurrentHashSmithMap::new();
    map.put(1, 10);
    assert!(!map.replace_exact(1, &99, 20));
    assert_eq!(map.get(&1), Some(10));
    assert!(map.replace_exact(1, &10, 20));
    assert_eq!(map.get(&1), Some(20));
}

#[test]
fn remove_if_only_removes_matching_value() {
    let map = ConcurrentHashSmithMap::new();
    map.put(1, 10);
    assert!(!map.remove_if(&1, &99));
    assert!(map.remove_if(&1, &10));
    assert_eq!(map.get(&1), None);
}

/// Property P8: N concurrent inserts of distinct keys all survive, and the
/// final approximate size equals N.
#[test]
fn no_lost_updates_across_disjoint_concurrent_inserts() {
    let map = Arc::new(ConcurrentHashSmithMap::new());
    let thread_count = 8usize;
    let per_thread = 2_000usize;

    let handles: Vec<_> = (0..thread_count)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let base = t * per_thread;
                for i in 0..per_thread {
                    map.put(base + i, (base + i) * 2);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), thread_count * per_thread);
    for t in 0..thread_count {
        let base = t * per_thread;
        for i in 0..per_thread {
            assert_eq!(map.get(&(base + i)), Some((base + i) * 2));
        }
    }
}

/// Property P7: a reader racing concurrent inserts never observes a value
/// for a key it cannot subsequently re-read.
#[test]
fn concurrent_readers_never_observe_a_torn_publication() {
    let map = Arc::new(ConcurrentHashSmithMap::new());
    let writer = {
        let map = Arc::clone(&map);
        thread::spawn(move || {
            for i in 0..5_000 {
                map.put(i, i * 3);
            }
        })
    };

    let reader = {
        let map = Arc::clone(&map);
        thread::spawn(move || {
            for i in 0..5_000 {
                if let Some(v) = map.get(&i) {
                    assert_eq!(v, i * 3);
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}
