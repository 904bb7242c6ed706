use crate::entry::Entry;
use crate::iter::*;
use crate::reclaim::{Atomic, Collector, Guard, Linked, RetireShared, Shared};
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{BuildHasher, Hash};
use std::iter::FromIterator;
use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) type Table<K, V, S> = HashMap<K, Arc<Entry<V>>, S>;

/// An immutable view of the map.
///
/// Published through `SyncMap::read` and replaced wholesale, never modified in place. Only the
/// per-entry value pointers change.
pub(crate) struct ReadOnly<K, V, S> {
    pub(crate) table: Arc<Table<K, V, S>>,
    /// `true` if the overlay contains keys that are missing from `table`.
    pub(crate) amended: bool,
}

impl<K, V, S> ReadOnly<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn get<Q>(&self, key: &Q) -> Option<&Arc<Entry<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.get(key)
    }
}

fn is_amended<K, V, S>(read: Option<&ReadOnly<K, V, S>>) -> bool {
    read.map_or(false, |read| read.amended)
}

/// The mutable side of the map. Only ever accessed with `SyncMap::dirty` locked.
struct Overlay<K, V, S> {
    /// Every non-expunged entry of the snapshot, plus the keys that are missing from it.
    ///
    /// `None` right after a promotion. It is seeded from the snapshot on the first store of a key
    /// that the snapshot does not hold.
    table: Option<Table<K, V, S>>,

    /// Number of loads since the last promotion that had to consult the overlay.
    ///
    /// Once this reaches the size of the overlay, the overlay is promoted to be the next
    /// snapshot, as the cost of the promotion has then been amortized by the misses.
    misses: usize,
}

/// An entry found either in the snapshot or in the overlay.
enum Found<'g, V> {
    Snapshot(&'g Entry<V>),
    Overlay(Arc<Entry<V>>),
}

impl<V> Deref for Found<'_, V> {
    type Target = Entry<V>;

    fn deref(&self) -> &Entry<V> {
        match *self {
            Found::Snapshot(entry) => entry,
            Found::Overlay(ref entry) => entry,
        }
    }
}

/// A concurrent map optimized for keys that are written once and read many times, and for
/// threads that operate on disjoint sets of keys.
///
/// Loads, and stores to keys that are already present, are served from an immutable snapshot and
/// never take a lock. New keys go into a lock-protected overlay, which is promoted to become the
/// next snapshot once enough loads have missed the snapshot.
///
/// References handed out by the map are tied to a [`Guard`] from [`SyncMap::guard`], which keeps
/// replaced values (and snapshots) alive for as long as it exists. For more information, see the
/// [notes in the crate-level documentation].
///
/// [notes in the crate-level documentation]: index.html#a-note-on-guards
pub struct SyncMap<K, V, S = crate::DefaultHashBuilder> {
    /// The current snapshot. Null until the first key is stored.
    read: Atomic<ReadOnly<K, V, S>>,

    dirty: Mutex<Overlay<K, V, S>>,

    /// Capacity of the first overlay, which will hold every key stored before the first promotion.
    initial_capacity: usize,

    /// Collector that all `Guard` references used for operations on this map must be tied to.
    ///
    /// Values and snapshots are retired through the guard passed in, so a guard from a different
    /// collector would not keep them alive.
    collector: Collector,

    build_hasher: S,
}

unsafe impl<K, V, S> Send for SyncMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Send,
{
}

unsafe impl<K, V, S> Sync for SyncMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Sync,
{
}

/// The error type for the [`SyncMap::compare_and_swap`] method.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompareAndSwapError<'g, V> {
    /// A reference to the current value mapped to the key, if there is one.
    pub current: Option<&'g V>,
    /// The value that [`SyncMap::compare_and_swap`] failed to store.
    pub not_swapped: V,
}

impl<'g, V> Display for CompareAndSwapError<'g, V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.current {
            Some(current) => write!(
                f,
                "Swap to \"{:?}\" failed as the key is mapped to \"{:?}\"",
                self.not_swapped, current
            ),
            None => write!(
                f,
                "Swap to \"{:?}\" failed as the key is not present",
                self.not_swapped
            ),
        }
    }
}

impl<'g, V> Error for CompareAndSwapError<'g, V>
where
    V: Debug,
{
    #[inline]
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

// ===
// the following methods only see Ks and Vs if there have been inserts.
// modifications to the map are all guarded by thread-safety bounds (Send + Sync + 'static).
// but _these_ methods do not need to be, since they will never introduce keys or values, only give
// out ones that have already been inserted (which implies they must be thread-safe).
// ===

impl<K, V> SyncMap<K, V, crate::DefaultHashBuilder> {
    /// Creates an empty `SyncMap`.
    ///
    /// The map does not allocate until it is first stored into.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    /// let map: SyncMap<&str, i32> = SyncMap::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `SyncMap` whose first overlay can hold `capacity` keys without
    /// reallocating.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    /// let map: SyncMap<&str, i32> = SyncMap::with_capacity(10);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, crate::DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for SyncMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> SyncMap<K, V, S> {
    /// Creates an empty map which will use `hash_builder` to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed to
    /// allow the map to be resistant to attacks that cause many collisions and
    /// very poor performance. Setting it manually using this
    /// function can expose a DoS attack vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::{SyncMap, DefaultHashBuilder};
    ///
    /// let map = SyncMap::with_hasher(DefaultHashBuilder::default());
    /// map.pin().store(1, 2);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with the specified initial overlay capacity, using `hash_builder` to
    /// hash the keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed to allow the map
    /// to be resistant to attacks that cause many collisions and very poor performance.
    /// Setting it manually using this function can expose a DoS attack vector.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            read: Atomic::null(),
            dirty: Mutex::new(Overlay {
                table: None,
                misses: 0,
            }),
            initial_capacity: capacity,
            collector: Collector::new(),
            build_hasher: hash_builder,
        }
    }

    /// Pin a `Guard` for use with this map.
    ///
    /// Keep in mind that for as long as you hold onto this `Guard`, you are preventing the
    /// collection of garbage generated by the map.
    pub fn guard(&self) -> Guard<'_> {
        self.collector.enter()
    }

    #[inline]
    fn check_guard(&self, guard: &Guard<'_>) {
        // guard.collector() may be `None` if it is unprotected
        if let Some(c) = guard.collector() {
            assert!(
                std::ptr::eq(c, &self.collector),
                "guard belongs to a different map"
            );
        }
    }

    fn read_only<'g>(&'g self, guard: &'g Guard<'_>) -> Option<&'g ReadOnly<K, V, S>> {
        let read = self.read.load(Ordering::Acquire, guard);
        // safety: we loaded the snapshot through the guard. a snapshot is only retired after it
        // has been replaced, so it won't be dropped until our guard is dropped at the earliest.
        unsafe { read.as_ref() }.map(|read| &**read)
    }

    /// Replaces the current snapshot. Must be called with the overlay lock held.
    fn publish(&self, read: ReadOnly<K, V, S>, guard: &Guard<'_>) {
        let new = Shared::boxed(read, &self.collector);
        let old = self.read.swap(new, Ordering::AcqRel, guard);
        if !old.is_null() {
            // safety: the old snapshot is no longer reachable through `self.read`. threads that
            // loaded it before the swap hold guards that keep it alive until they are dropped.
            unsafe { guard.retire_shared(old) };
        }
    }

    /// Turns the overlay into the next snapshot. Must be called with the overlay lock held.
    fn promote_locked(&self, dirty: &mut Overlay<K, V, S>, guard: &Guard<'_>) {
        let table = match dirty.table.take() {
            Some(table) => table,
            None => {
                // the overlay only goes away through a promotion, after which the snapshot is no
                // longer amended, so nobody should be promoting again.
                debug_assert!(false, "promoted an amended snapshot without an overlay");
                dirty.misses = 0;
                return;
            }
        };
        log::trace!(
            "promoting overlay with {} entries after {} misses",
            table.len(),
            dirty.misses
        );
        dirty.misses = 0;
        self.publish(
            ReadOnly {
                table: Arc::new(table),
                amended: false,
            },
            guard,
        );
    }

    /// Records a load that had to consult the overlay, promoting it once the misses have caught
    /// up with its size.
    fn miss_locked(&self, dirty: &mut Overlay<K, V, S>, guard: &Guard<'_>) {
        dirty.misses += 1;
        let len = dirty.table.as_ref().map_or(0, HashMap::len);
        if dirty.misses < len {
            return;
        }
        self.promote_locked(dirty, guard);
    }

    /// Returns a snapshot that holds every key of the map, promoting the overlay if necessary.
    fn promoted<'g>(&'g self, guard: &'g Guard<'_>) -> Option<&'g ReadOnly<K, V, S>> {
        let read = self.read_only(guard);
        if !is_amended(read) {
            return read;
        }

        let mut dirty = self.dirty.lock();
        if is_amended(self.read_only(guard)) {
            log::trace!("forcing promotion of the overlay for a full traversal");
            self.promote_locked(&mut dirty, guard);
        }
        // the promoted snapshot must be loaded through the guard before it can be used, and it
        // cannot be replaced again while we hold the lock.
        self.read_only(guard)
    }

    /// An iterator visiting all key-value pairs in arbitrary order.
    ///
    /// The iterator element type is `(&'g K, &'g V)`.
    ///
    /// Any keys stored since the last promotion are promoted first, so the iterator observes
    /// every key that was present when it was created. Stores and deletes that happen while
    /// iterating may or may not be observed, but no key is yielded more than once.
    pub fn iter<'g>(&'g self, guard: &'g Guard<'_>) -> Iter<'g, K, V> {
        self.check_guard(guard);
        let read = self.promoted(guard);
        Iter::new(read.map(|read| &*read.table), guard)
    }

    /// An iterator visiting all keys in arbitrary order.
    ///
    /// The iterator element type is `&'g K`.
    pub fn keys<'g>(&'g self, guard: &'g Guard<'_>) -> Keys<'g, K, V> {
        Keys {
            iter: self.iter(guard),
        }
    }

    /// An iterator visiting all values in arbitrary order.
    ///
    /// The iterator element type is `&'g V`.
    pub fn values<'g>(&'g self, guard: &'g Guard<'_>) -> Values<'g, K, V> {
        Values {
            iter: self.iter(guard),
        }
    }

    /// Calls `f` for each key and value present in the map, in arbitrary order.
    ///
    /// If `f` returns `false`, the traversal stops.
    ///
    /// The traversal runs against a single snapshot, so it never visits the same key twice. It
    /// does not hold any lock while calling `f`, so `f` may itself operate on the map. Stores
    /// and deletes that happen concurrently may or may not be reflected.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// let guard = map.guard();
    /// map.store("a", 1, &guard);
    /// map.store("b", 2, &guard);
    ///
    /// let mut sum = 0;
    /// map.range(|_, v| { sum += v; true }, &guard);
    /// assert_eq!(sum, 3);
    /// ```
    pub fn range<'g, F>(&'g self, mut f: F, guard: &'g Guard<'_>)
    where
        F: FnMut(&'g K, &'g V) -> bool,
    {
        for (key, value) in self.iter(guard) {
            if !f(key, value) {
                break;
            }
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// This walks the whole map, and so takes time linear in the number of keys.
    pub fn len(&self) -> usize {
        let guard = self.guard();
        self.iter(&guard).count()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    pub fn is_empty(&self) -> bool {
        let guard = self.guard();
        self.iter(&guard).next().is_none()
    }

    /// Clears the map, removing all key-value pairs.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    ///
    /// map.pin().store(1, "a");
    /// map.pin().clear();
    /// assert!(map.pin().is_empty());
    /// ```
    pub fn clear(&self, guard: &Guard<'_>) {
        self.check_guard(guard);
        let read = self.read_only(guard);
        if read.map_or(true, |read| read.table.is_empty() && !read.amended) {
            return;
        }

        let mut dirty = self.dirty.lock();
        let read = self.read_only(guard);
        let overlay = dirty.table.take();
        dirty.misses = 0;

        // entries of the dropped tables may still be reached by threads that loaded the old
        // snapshot. expunging them sends any store through those threads to the locked path,
        // where it will find the new, empty snapshot.
        let mut cleared = 0;
        let tables = read.map(|read| &*read.table).into_iter().chain(overlay.iter());
        for table in tables {
            for entry in table.values() {
                if entry.expunge(guard).is_some() {
                    cleared += 1;
                }
            }
        }
        log::trace!("cleared {} entries", cleared);

        if read.is_some() {
            let new = Shared::null();
            let old = self.read.swap(new, Ordering::AcqRel, guard);
            // safety: as in `publish`
            unsafe { guard.retire_shared(old) };
        }
        drop(overlay);
    }
}

// ===
// the following methods never introduce new items (so they do not need the thread-safety bounds),
// but they _do_ perform lookups, which require hashing and equality.
// ===

impl<K, V, S> SyncMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Finds the entry for `key`, consulting the overlay (and counting a miss) only if the key is
    /// missing from an amended snapshot.
    fn find<'g, Q>(&'g self, key: &Q, guard: &'g Guard<'_>) -> Option<Found<'g, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let read = self.read_only(guard);
        if let Some(entry) = read.and_then(|read| read.get(key)) {
            return Some(Found::Snapshot(entry));
        }
        if !is_amended(read) {
            return None;
        }

        let mut dirty = self.dirty.lock();
        // the overlay may have been promoted while we were waiting for the lock
        let read = self.read_only(guard);
        if let Some(entry) = read.and_then(|read| read.get(key)) {
            return Some(Found::Snapshot(entry));
        }
        if !is_amended(read) {
            return None;
        }

        let entry = dirty
            .table
            .as_ref()
            .and_then(|table| table.get(key))
            .map(Arc::clone);
        // regardless of whether the key was present, this load had to take the lock. once enough
        // loads have paid that price, the overlay is promoted.
        self.miss_locked(&mut dirty, guard);
        entry.map(Found::Overlay)
    }

    /// Returns the value stored in the map for `key`, or `None` if no value is present.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash` and `Eq` on the borrowed
    /// form must match those for the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// let guard = map.guard();
    /// map.store(1, "a", &guard);
    /// assert_eq!(map.load(&1, &guard), Some(&"a"));
    /// assert_eq!(map.load(&2, &guard), None);
    /// ```
    pub fn load<'g, Q>(&'g self, key: &Q, guard: &'g Guard<'_>) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.check_guard(guard);
        self.find(key, guard)?.load(guard)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash` and `Eq` on the borrowed
    /// form must match those for the key type.
    pub fn contains_key<Q>(&self, key: &Q, guard: &Guard<'_>) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.load(key, guard).is_some()
    }

    /// Deletes the value for `key`, returning the previous value if the key was present.
    ///
    /// The returned reference stays valid for as long as `guard` is held.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// let guard = map.guard();
    /// map.store(1, "a", &guard);
    /// assert_eq!(map.load_and_delete(&1, &guard), Some(&"a"));
    /// assert_eq!(map.load_and_delete(&1, &guard), None);
    /// ```
    pub fn load_and_delete<'g, Q>(&'g self, key: &Q, guard: &'g Guard<'_>) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.check_guard(guard);
        let read = self.read_only(guard);
        if let Some(entry) = read.and_then(|read| read.get(key)) {
            return entry.delete(guard);
        }
        if !is_amended(read) {
            return None;
        }

        let mut dirty = self.dirty.lock();
        let read = self.read_only(guard);
        let entry = match read.and_then(|read| read.get(key)) {
            Some(entry) => Found::Snapshot(entry),
            None if !is_amended(read) => return None,
            None => {
                // keys that are missing from the snapshot live only in the overlay, so removing
                // them from there is enough to make them unreachable.
                let entry = dirty.table.as_mut().and_then(|table| table.remove(key));
                self.miss_locked(&mut dirty, guard);
                Found::Overlay(entry?)
            }
        };
        drop(dirty);

        entry.delete(guard)
    }

    /// Deletes the value for `key`.
    pub fn delete<Q>(&self, key: &Q, guard: &Guard<'_>)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.load_and_delete(key, guard);
    }

    /// Deletes the entry for `key` if its value is equal to `old`.
    ///
    /// Returns `true` if the entry was deleted. If there is no value for `key`, this returns
    /// `false`.
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V, guard: &Guard<'_>) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        self.check_guard(guard);
        // the key is left in the overlay: had the comparison failed, it would still be needed
        match self.find(key, guard) {
            Some(entry) => entry.compare_and_delete(old, guard),
            None => false,
        }
    }

    pub(crate) fn guarded_eq(&self, other: &Self, our_guard: &Guard<'_>, their_guard: &Guard<'_>) -> bool
    where
        V: PartialEq,
    {
        self.iter(our_guard)
            .all(|(key, value)| other.load(key, their_guard).map_or(false, |v| *value == *v))
    }
}

// ===
// the following methods _do_ introduce items into the map, and so must require that the keys and
// values are thread safe, and can be garbage collected at a later time.
// ===

impl<K, V, S> SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    /// Returns the overlay, seeding it from the snapshot if there is none.
    ///
    /// Deleted entries of the snapshot are expunged rather than copied, so that they are dropped by
    /// the next promotion. Must be called with the overlay lock held.
    fn overlay_locked<'d>(
        &self,
        dirty: &'d mut Overlay<K, V, S>,
        read: Option<&ReadOnly<K, V, S>>,
        guard: &Guard<'_>,
    ) -> &'d mut Table<K, V, S> {
        dirty.table.get_or_insert_with(|| {
            let capacity = read.map_or(self.initial_capacity, |read| read.table.len());
            let mut table = HashMap::with_capacity_and_hasher(capacity, self.build_hasher.clone());
            if let Some(read) = read {
                for (key, entry) in read.table.iter() {
                    if !entry.try_expunge_locked(guard) {
                        table.insert(key.clone(), Arc::clone(entry));
                    }
                }
                log::trace!(
                    "seeded overlay with {} of {} snapshot entries",
                    table.len(),
                    read.table.len()
                );
            }
            table
        })
    }

    /// Adds an entry for a key that is in neither the snapshot nor the overlay.
    fn insert_locked(
        &self,
        dirty: &mut Overlay<K, V, S>,
        read: Option<&ReadOnly<K, V, S>>,
        key: K,
        entry: Entry<V>,
        guard: &Guard<'_>,
    ) {
        let amended = is_amended(read);
        self.overlay_locked(dirty, read, guard)
            .insert(key, Arc::new(entry));

        if !amended {
            // this is the first key that is missing from the snapshot, so from now on misses on
            // the snapshot must consult the overlay.
            let table = match read {
                Some(read) => Arc::clone(&read.table),
                None => Arc::new(HashMap::with_hasher(self.build_hasher.clone())),
            };
            self.publish(
                ReadOnly {
                    table,
                    amended: true,
                },
                guard,
            );
        }
    }

    /// Stores `value` for `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// let guard = map.guard();
    /// map.store(37, "a", &guard);
    /// map.store(37, "b", &guard);
    /// assert_eq!(map.load(&37, &guard), Some(&"b"));
    /// ```
    pub fn store(&self, key: K, value: V, guard: &Guard<'_>) {
        self.swap(key, value, guard);
    }

    /// Stores `value` for `key` and returns the previous value, if any.
    ///
    /// The returned reference stays valid for as long as `guard` is held.
    pub fn swap<'g>(&'g self, key: K, value: V, guard: &'g Guard<'_>) -> Option<&'g V> {
        self.check_guard(guard);
        // the value must be linked before the snapshot is loaded, so that the guard's protection
        // covers it once it is published.
        let new = Shared::boxed(value, &self.collector);

        let read = self.read_only(guard);
        if let Some(entry) = read.and_then(|read| read.get(&key)) {
            if let Ok(old) = entry.try_swap(new, guard) {
                return old;
            }
        }

        let mut dirty = self.dirty.lock();
        let read = self.read_only(guard);
        if let Some(entry) = read.and_then(|read| read.get(&key)) {
            if entry.unexpunge_locked(guard) {
                // the entry was expunged, which implies that there is an overlay and that the
                // entry is not in it.
                debug_assert!(dirty.table.is_some());
                self.overlay_locked(&mut dirty, read, guard)
                    .insert(key, Arc::clone(entry));
            }
            return entry.swap_locked(new, guard);
        }
        if let Some(entry) = dirty.table.as_ref().and_then(|table| table.get(&key)) {
            return entry.swap_locked(new, guard);
        }

        self.insert_locked(&mut dirty, read, key, Entry::from_shared(new), guard);
        None
    }

    /// Returns the existing value for `key` if present. Otherwise, stores and returns `value`.
    ///
    /// The `bool` is `true` if the value was loaded, and `false` if it was stored.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// let guard = map.guard();
    /// assert_eq!(map.load_or_store("a", 3, &guard), (&3, false));
    /// assert_eq!(map.load_or_store("a", 4, &guard), (&3, true));
    /// ```
    pub fn load_or_store<'g>(&'g self, key: K, value: V, guard: &'g Guard<'_>) -> (&'g V, bool) {
        self.check_guard(guard);
        let read = self.read_only(guard);
        let entry = read.and_then(|read| read.get(&key));
        if let Some(current) = entry.and_then(|entry| entry.load(guard)) {
            return (current, true);
        }

        let mut new = Shared::boxed(value, &self.collector);
        if let Some(entry) = entry {
            match entry.try_load_or_store(new, guard) {
                Ok(result) => return result,
                Err(not_stored) => new = not_stored,
            }
        }

        let mut dirty = self.dirty.lock();
        let read = self.read_only(guard);
        if let Some(entry) = read.and_then(|read| read.get(&key)) {
            if entry.unexpunge_locked(guard) {
                debug_assert!(dirty.table.is_some());
                self.overlay_locked(&mut dirty, read, guard)
                    .insert(key, Arc::clone(entry));
            }
            return match entry.try_load_or_store(new, guard) {
                Ok(result) => result,
                Err(_) => unreachable!("entries are only expunged with the overlay lock held"),
            };
        }
        if let Some(entry) = dirty
            .table
            .as_ref()
            .and_then(|table| table.get(&key))
            .map(Arc::clone)
        {
            let result = match entry.try_load_or_store(new, guard) {
                Ok(result) => result,
                Err(_) => unreachable!("entries in the overlay are never expunged"),
            };
            self.miss_locked(&mut dirty, guard);
            return result;
        }

        // safety: `new` is about to be owned by the map, which only retires it through a guard.
        // the snapshot was reloaded through our guard after `new` was linked, so the guard keeps
        // it alive even if another thread replaces it as soon as the lock is released.
        let stored: &'g Linked<V> = unsafe { new.deref() };
        self.insert_locked(&mut dirty, read, key, Entry::from_shared(new), guard);
        (&**stored, false)
    }

    /// Stores `new` for `key` if the current value is equal to `old`.
    ///
    /// On success, returns a reference to the newly stored value. On failure, the error holds the
    /// current value (`None` if the key is absent) and gives `new` back.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// let guard = map.guard();
    /// map.store(1, 10, &guard);
    /// assert_eq!(map.compare_and_swap(&1, &10, 11, &guard), Ok(&11));
    ///
    /// let err = map.compare_and_swap(&1, &10, 12, &guard).unwrap_err();
    /// assert_eq!(err.current, Some(&11));
    /// assert_eq!(err.not_swapped, 12);
    /// ```
    pub fn compare_and_swap<'g, Q>(
        &'g self,
        key: &Q,
        old: &V,
        new: V,
        guard: &'g Guard<'_>,
    ) -> Result<&'g V, CompareAndSwapError<'g, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        self.check_guard(guard);
        let entry = match self.find(key, guard) {
            Some(entry) => entry,
            None => {
                return Err(CompareAndSwapError {
                    current: None,
                    not_swapped: new,
                })
            }
        };

        // `try_compare_and_swap` loads the entry through the guard before publishing `new`
        let new = Shared::boxed(new, &self.collector);
        entry
            .try_compare_and_swap(old, new, guard)
            .map_err(|(current, new)| {
                // safety: `new` was never published, so we are its only owner.
                let new = unsafe { new.into_box() };
                CompareAndSwapError {
                    current,
                    not_swapped: Linked::into_inner(*new),
                }
            })
    }

    /// Stores all the key-value pairs of `iter`, using a single guard.
    fn store_all<I: Iterator<Item = (K, V)>>(&self, iter: I, guard: &Guard<'_>) {
        for (key, value) in iter {
            self.store(key, value, guard);
        }
    }
}

impl<K, V, S> PartialEq for SyncMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.guarded_eq(other, &self.guard(), &other.guard())
    }
}

impl<K, V, S> Eq for SyncMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> fmt::Debug for SyncMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let guard = self.guard();
        f.debug_map().entries(self.iter(&guard)).finish()
    }
}

impl<K, V, S> Drop for SyncMap<K, V, S> {
    fn drop(&mut self) {
        // safety: we have &mut self _and_ all references we have returned are bound to the
        // lifetime of their borrow of self, so there cannot be any outstanding references to
        // anything in the map.
        let read = self.read.get_mut();
        if !read.is_null() {
            // dropping the snapshot drops its references to the entries. entries that are also
            // in the overlay go away together with it, and free their values on the way out.
            drop(unsafe { read.into_box() });
        }
    }
}

impl<K, V, S> Extend<(K, V)> for &SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let guard = self.guard();
        (*self).store_all(iter.into_iter(), &guard);
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for &SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Copy + Hash + Eq,
    V: 'static + Sync + Send + Copy,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&key, &value)| (key, value)));
    }
}

impl<K, V, S> FromIterator<(K, V)> for SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let map = SyncMap::with_capacity_and_hasher(lower, S::default());
        {
            let guard = map.guard();
            map.store_all(iter, &guard);
        }
        map
    }
}

impl<'a, K, V, S> FromIterator<(&'a K, &'a V)> for SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Copy + Hash + Eq,
    V: 'static + Sync + Send + Copy,
    S: 'static + Sync + Send + BuildHasher + Clone + Default,
{
    fn from_iter<T: IntoIterator<Item = (&'a K, &'a V)>>(iter: T) -> Self {
        Self::from_iter(iter.into_iter().map(|(&k, &v)| (k, v)))
    }
}

impl<K, V, S> Clone for SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send + Clone,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    fn clone(&self) -> SyncMap<K, V, S> {
        let cloned_map = Self::with_capacity_and_hasher(self.len(), self.build_hasher.clone());
        {
            let guard = self.guard();
            let cloned_guard = cloned_map.guard();
            for (k, v) in self.iter(&guard) {
                cloned_map.store(k.clone(), v.clone(), &cloned_guard);
            }
        }
        cloned_map
    }
}
