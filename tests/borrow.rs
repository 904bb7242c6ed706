use std::sync::Arc;
use syncmap::*;

// These tests all use `K = String` and `Q = str` for `Borrow`-based lookups

#[test]
fn load_empty() {
    let map = SyncMap::<String, usize>::new();

    {
        let guard = map.guard();
        let e = map.load("foo", &guard);
        assert!(e.is_none());
    }
}

#[test]
fn delete_empty() {
    let map = SyncMap::<String, usize>::new();

    {
        let guard = map.guard();
        let old = map.load_and_delete("foo", &guard);
        assert!(old.is_none());
    }
}

#[test]
fn store_and_delete() {
    let map = SyncMap::<String, usize>::new();

    {
        let guard = map.guard();
        map.store("foo".to_string(), 0, &guard);
        let old = map.load_and_delete("foo", &guard).unwrap();
        assert_eq!(old, &0);
        assert!(map.load("foo", &guard).is_none());
    }
}

#[test]
fn store_and_load() {
    let map = SyncMap::<String, usize>::new();

    map.store("foo".to_string(), 0, &map.guard());
    {
        let guard = map.guard();
        let e = map.load("foo", &guard).unwrap();
        assert_eq!(e, &0);
    }
}

#[test]
fn update() {
    let map = SyncMap::<String, usize>::new();

    let guard = map.guard();
    map.store("foo".to_string(), 0, &guard);
    let old = map.swap("foo".to_string(), 1, &guard);
    assert_eq!(old, Some(&0));
    {
        let guard = map.guard();
        let e = map.load("foo", &guard).unwrap();
        assert_eq!(e, &1);
    }
}

#[test]
fn compare_by_borrowed_key() {
    let map = SyncMap::<String, usize>::new();

    let guard = map.guard();
    map.store("foo".to_string(), 0, &guard);
    assert!(map.compare_and_swap("foo", &0, 1, &guard).is_ok());
    assert!(map.compare_and_delete("foo", &1, &guard));
    assert!(!map.contains_key("foo", &guard));
}

#[test]
fn concurrent_store() {
    let map = Arc::new(SyncMap::<String, usize>::new());
    let keys = Arc::new((0..64).map(|i| i.to_string()).collect::<Vec<_>>());

    let map1 = map.clone();
    let keys1 = keys.clone();
    let t1 = std::thread::spawn(move || {
        for key in keys1.iter() {
            map1.store(key.clone(), 0, &map1.guard());
        }
    });
    let map2 = map.clone();
    let keys2 = keys.clone();
    let t2 = std::thread::spawn(move || {
        for key in keys2.iter() {
            map2.store(key.clone(), 1, &map2.guard());
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    let guard = map.guard();
    for key in keys.iter() {
        let v = map.load(key.as_str(), &guard).unwrap();
        assert!(v == &0 || v == &1);
    }
}

#[test]
fn concurrent_delete() {
    let map = Arc::new(SyncMap::<String, usize>::new());
    let keys = Arc::new((0..64).map(|i| i.to_string()).collect::<Vec<_>>());

    {
        let guard = map.guard();
        for (i, key) in keys.iter().enumerate() {
            map.store(key.clone(), i, &guard);
        }
    }

    let map1 = map.clone();
    let keys1 = keys.clone();
    let t1 = std::thread::spawn(move || {
        let guard = map1.guard();
        for (i, key) in keys1.iter().enumerate() {
            if let Some(v) = map1.load_and_delete(key.as_str(), &guard) {
                assert_eq!(v, &i);
            }
        }
    });
    let map2 = map.clone();
    let keys2 = keys.clone();
    let t2 = std::thread::spawn(move || {
        let guard = map2.guard();
        for (i, key) in keys2.iter().enumerate() {
            if let Some(v) = map2.load_and_delete(key.as_str(), &guard) {
                assert_eq!(v, &i);
            }
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    // after joining the threads, the map should be empty
    let guard = map.guard();
    for key in keys.iter() {
        assert!(map.load(key.as_str(), &guard).is_none());
    }
}
