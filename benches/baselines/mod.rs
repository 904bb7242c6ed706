//! Reference maps to compare `SyncMap` against.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// The operations that the benchmarks exercise, over `u64` keys and values.
pub trait MapInterface: Default + Send + Sync + 'static {
    fn load(&self, key: u64) -> Option<u64>;
    fn store(&self, key: u64, value: u64);
    fn load_or_store(&self, key: u64, value: u64) -> (u64, bool);
    fn delete(&self, key: u64);
    fn range<F: FnMut(u64, u64) -> bool>(&self, f: F);
}

/// A map guarded by a single reader-writer lock.
#[derive(Default)]
pub struct RwLockMap {
    inner: RwLock<HashMap<u64, u64>>,
}

impl MapInterface for RwLockMap {
    fn load(&self, key: u64) -> Option<u64> {
        self.inner.read().get(&key).copied()
    }

    fn store(&self, key: u64, value: u64) {
        self.inner.write().insert(key, value);
    }

    fn load_or_store(&self, key: u64, value: u64) -> (u64, bool) {
        if let Some(&v) = self.inner.read().get(&key) {
            return (v, true);
        }
        let mut inner = self.inner.write();
        match inner.get(&key) {
            Some(&v) => (v, true),
            None => {
                inner.insert(key, value);
                (value, false)
            }
        }
    }

    fn delete(&self, key: u64) {
        self.inner.write().remove(&key);
    }

    fn range<F: FnMut(u64, u64) -> bool>(&self, mut f: F) {
        // f may modify the map, so it must not be called with the lock held
        let keys: Vec<u64> = self.inner.read().keys().copied().collect();
        for key in keys {
            if let Some(value) = self.load(key) {
                if !f(key, value) {
                    break;
                }
            }
        }
    }
}

/// A map that copies itself on every write, so that reads only ever see an immutable table.
#[derive(Default)]
pub struct DeepCopyMap {
    writer: Mutex<()>,
    clean: RwLock<Arc<HashMap<u64, u64>>>,
}

impl DeepCopyMap {
    fn snapshot(&self) -> Arc<HashMap<u64, u64>> {
        Arc::clone(&self.clean.read())
    }

    fn update<F: FnOnce(&mut HashMap<u64, u64>)>(&self, f: F) {
        let _writer = self.writer.lock();
        let mut dirty = HashMap::clone(&self.snapshot());
        f(&mut dirty);
        *self.clean.write() = Arc::new(dirty);
    }
}

impl MapInterface for DeepCopyMap {
    fn load(&self, key: u64) -> Option<u64> {
        self.clean.read().get(&key).copied()
    }

    fn store(&self, key: u64, value: u64) {
        self.update(|dirty| {
            dirty.insert(key, value);
        });
    }

    fn load_or_store(&self, key: u64, value: u64) -> (u64, bool) {
        if let Some(v) = self.load(key) {
            return (v, true);
        }
        let _writer = self.writer.lock();
        let clean = self.snapshot();
        if let Some(&v) = clean.get(&key) {
            return (v, true);
        }
        let mut dirty = HashMap::clone(&clean);
        dirty.insert(key, value);
        *self.clean.write() = Arc::new(dirty);
        (value, false)
    }

    fn delete(&self, key: u64) {
        self.update(|dirty| {
            dirty.remove(&key);
        });
    }

    fn range<F: FnMut(u64, u64) -> bool>(&self, mut f: F) {
        for (&key, &value) in self.snapshot().iter() {
            if !f(key, value) {
                break;
            }
        }
    }
}
