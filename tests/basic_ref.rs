use std::sync::Arc;
use syncmap::SyncMap;

#[test]
fn clear() {
    let map = SyncMap::<usize, usize>::new();
    let map = map.pin();
    {
        map.store(0, 1);
        map.store(1, 1);
        map.store(2, 1);
        map.store(3, 1);
        map.store(4, 1);
    }
    map.clear();
    assert!(map.is_empty());
}

#[test]
fn swap() {
    let map = SyncMap::<usize, usize>::new();
    let map = map.pin();

    let old = map.swap(42, 0);
    assert!(old.is_none());
}

#[test]
fn load_empty() {
    let map = SyncMap::<usize, usize>::new();

    {
        let map = map.pin();
        let e = map.load(&42);
        assert!(e.is_none());
    }
}

#[test]
fn delete_empty() {
    let map = SyncMap::<usize, usize>::new();

    {
        let map = map.pin();
        let old = map.load_and_delete(&42);
        assert!(old.is_none());
    }
}

#[test]
fn store_and_delete() {
    let map = SyncMap::<usize, usize>::new();

    {
        let map = map.pin();
        map.store(42, 0);
        let old = map.load_and_delete(&42).unwrap();
        assert_eq!(old, &0);
        assert!(map.load(&42).is_none());
    }
}

#[test]
fn store_and_load() {
    let map = SyncMap::<usize, usize>::new();

    map.pin().store(42, 0);
    {
        let map = map.pin();
        let e = map.load(&42).unwrap();
        assert_eq!(e, &0);
    }
}

#[test]
fn update() {
    let map = SyncMap::<usize, usize>::new();

    let map1 = map.pin();
    map1.store(42, 0);
    let old = map1.swap(42, 1);
    assert_eq!(old, Some(&0));
    {
        let map2 = map.pin();
        let e = map2.load(&42).unwrap();
        assert_eq!(e, &1);
    }
}

#[test]
fn load_or_store() {
    let map = SyncMap::<&'static str, usize>::new();
    let map = map.pin();

    assert_eq!(map.load_or_store("a", 1), (&1, false));
    assert_eq!(map.load_or_store("a", 2), (&1, true));
    map.delete("a");
    assert_eq!(map.load_or_store("a", 3), (&3, false));
    assert!(map.contains_key("a"));
}

#[test]
fn compare_and_swap() {
    let map = SyncMap::<usize, usize>::new();
    let map = map.pin();

    map.store(1, 10);
    assert_eq!(map.compare_and_swap(&1, &10, 11), Ok(&11));
    assert!(map.compare_and_swap(&1, &10, 12).is_err());
    assert!(!map.compare_and_delete(&1, &10));
    assert!(map.compare_and_delete(&1, &11));
    assert!(map.is_empty());
}

#[test]
fn range() {
    let map: SyncMap<usize, usize> = (0..16).map(|x| (x, x)).collect();
    let map = map.pin();

    let mut sum = 0;
    map.range(|_, v| {
        sum += v;
        true
    });
    assert_eq!(sum, (0..16).sum());
}

#[test]
fn with_guard() {
    let map = SyncMap::<usize, usize>::new();
    let guard = map.guard();
    let map_ref = map.with_guard(&guard);

    map_ref.store(1, 1);
    assert_eq!(map.load(&1, &guard), map_ref.load(&1));
}

#[test]
fn index() {
    let map = SyncMap::<usize, usize>::new();
    let map = map.pin();
    map.store(1, 10);
    assert_eq!(map[&1], 10);
}

#[test]
#[should_panic(expected = "no entry found for key")]
fn index_missing() {
    let map = SyncMap::<usize, usize>::new();
    let map = map.pin();
    let _value = map[&1];
}

#[test]
fn concurrent_store() {
    let map = Arc::new(SyncMap::<usize, usize>::new());

    let map1 = map.clone();
    let t1 = std::thread::spawn(move || {
        for i in 0..64 {
            map1.pin().store(i, 0);
        }
    });
    let map2 = map.clone();
    let t2 = std::thread::spawn(move || {
        for i in 0..64 {
            map2.pin().store(i, 1);
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    let map = map.pin();
    for i in 0..64 {
        let v = map.load(&i).unwrap();
        assert!(v == &0 || v == &1);
    }
}

#[test]
fn concurrent_delete() {
    let map = Arc::new(SyncMap::<usize, usize>::new());

    {
        let map = map.pin();
        for i in 0..64 {
            map.store(i, i);
        }
    }

    let map1 = map.clone();
    let t1 = std::thread::spawn(move || {
        let map1 = map1.pin();
        for i in 0..64 {
            if let Some(v) = map1.load_and_delete(&i) {
                assert_eq!(v, &i);
            }
        }
    });
    let map2 = map.clone();
    let t2 = std::thread::spawn(move || {
        let map2 = map2.pin();
        for i in 0..64 {
            if let Some(v) = map2.load_and_delete(&i) {
                assert_eq!(v, &i);
            }
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    // after joining the threads, the map should be empty
    let map = map.pin();
    for i in 0..64 {
        assert!(map.load(&i).is_none());
    }
}

#[test]
fn current_kv_dropped() {
    let dropped1 = Arc::new(0);
    let dropped2 = Arc::new(0);

    let map = SyncMap::<Arc<usize>, Arc<usize>>::new();

    map.pin().store(dropped1.clone(), dropped2.clone());
    assert_eq!(Arc::strong_count(&dropped1), 2);
    assert_eq!(Arc::strong_count(&dropped2), 2);

    drop(map);

    // dropping the map should immediately drop (not deferred) all keys and values
    assert_eq!(Arc::strong_count(&dropped1), 1);
    assert_eq!(Arc::strong_count(&dropped2), 1);
}

#[test]
fn empty_maps_equal() {
    let map1 = SyncMap::<usize, usize>::new();
    let map2 = SyncMap::<usize, usize>::new();
    assert_eq!(map1, map2.pin());
    assert_eq!(map1.pin(), map2);
    assert_eq!(map1.pin(), map2.pin());
    assert_eq!(map2.pin(), map1.pin());
}

#[test]
fn different_size_maps_not_equal() {
    let map1 = SyncMap::<usize, usize>::new();
    let map2 = SyncMap::<usize, usize>::new();
    {
        let map1 = map1.pin();
        let map2 = map2.pin();
        map1.store(1, 0);
        map1.store(2, 0);
        map2.store(1, 0);
    }

    assert_ne!(map1, map2.pin());
    assert_ne!(map1.pin(), map2);
    assert_ne!(map1.pin(), map2.pin());
    assert_ne!(map2.pin(), map1.pin());
}

#[test]
fn same_values_equal() {
    let map1 = SyncMap::<usize, usize>::new();
    let map2 = SyncMap::<usize, usize>::new();
    {
        map1.pin().store(1, 0);
        map2.pin().store(1, 0);
    }

    assert_eq!(map1, map2.pin());
    assert_eq!(map1.pin(), map2);
    assert_eq!(map1.pin(), map2.pin());
    assert_eq!(map2.pin(), map1.pin());
}

#[test]
fn different_values_not_equal() {
    let map1 = SyncMap::<usize, usize>::new();
    let map2 = SyncMap::<usize, usize>::new();
    {
        map1.pin().store(1, 0);
        map2.pin().store(1, 1);
    }

    assert_ne!(map1, map2.pin());
    assert_ne!(map1.pin(), map2);
    assert_ne!(map1.pin(), map2.pin());
    assert_ne!(map2.pin(), map1.pin());
}

#[test]
fn clone_map_filled() {
    let map = SyncMap::<&'static str, u32>::new();
    let map = map.pin();
    map.store("FooKey", 0);
    map.store("BarKey", 10);
    let cloned_map = map.clone(); // another ref to the same map
    assert_eq!(map.len(), cloned_map.len());
    assert_eq!(map, cloned_map);

    // test that we are mapping the same tables
    map.store("NewItem", 100);
    assert_eq!(map, cloned_map);
}

#[test]
fn debug() {
    let map: SyncMap<usize, usize> = SyncMap::new();
    let map = map.pin();

    map.store(42, 0);
    map.store(16, 8);

    let formatted = format!("{:?}", map);

    assert!(formatted == "{42: 0, 16: 8}" || formatted == "{16: 8, 42: 0}");
}

#[test]
fn into_iter() {
    let map: SyncMap<usize, usize> = (0..4).map(|x| (x, x * 2)).collect();
    let map = map.pin();

    let mut collected: Vec<(usize, usize)> =
        (&map).into_iter().map(|(&k, &v)| (k, v)).collect();
    collected.sort();
    assert_eq!(collected, vec![(0, 0), (1, 2), (2, 4), (3, 6)]);
}
