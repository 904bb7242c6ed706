use crate::iter::*;
use crate::reclaim::{Guard, GuardRef};
use crate::{CompareAndSwapError, SyncMap};
use std::borrow::Borrow;
use std::fmt::{self, Debug, Formatter};
use std::hash::{BuildHasher, Hash};
use std::ops::Index;

/// A reference to a [`SyncMap`], constructed with [`SyncMap::pin`] or [`SyncMap::with_guard`].
///
/// The current thread will be pinned for the duration of this reference.
/// Keep in mind that this prevents the collection of garbage generated by the map.
pub struct SyncMapRef<'map, K, V, S = crate::DefaultHashBuilder> {
    pub(crate) map: &'map SyncMap<K, V, S>,
    guard: GuardRef<'map>,
}

impl<K, V, S> SyncMap<K, V, S> {
    /// Get a reference to this map with the current thread pinned.
    ///
    /// Keep in mind that for as long as you hold onto this, you are preventing the collection of
    /// garbage generated by the map.
    pub fn pin(&self) -> SyncMapRef<'_, K, V, S> {
        SyncMapRef {
            guard: GuardRef::Owned(self.guard()),
            map: self,
        }
    }

    /// Get a reference to this map with the given guard.
    pub fn with_guard<'g>(&'g self, guard: &'g Guard<'_>) -> SyncMapRef<'g, K, V, S> {
        SyncMapRef {
            guard: GuardRef::Ref(guard),
            map: self,
        }
    }
}

impl<K, V, S> SyncMapRef<'_, K, V, S> {
    /// An iterator visiting all key-value pairs in arbitrary order.
    /// The iterator element type is `(&'g K, &'g V)`.
    /// See also [`SyncMap::iter`].
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.map.iter(&self.guard)
    }

    /// An iterator visiting all keys in arbitrary order.
    /// The iterator element type is `&'g K`.
    /// See also [`SyncMap::keys`].
    pub fn keys(&self) -> Keys<'_, K, V> {
        self.map.keys(&self.guard)
    }

    /// An iterator visiting all values in arbitrary order.
    /// The iterator element type is `&'g V`.
    /// See also [`SyncMap::values`].
    pub fn values(&self) -> Values<'_, K, V> {
        self.map.values(&self.guard)
    }

    /// Calls `f` for each key and value present in the map, until it returns `false`.
    /// See also [`SyncMap::range`].
    pub fn range<'g, F>(&'g self, f: F)
    where
        F: FnMut(&'g K, &'g V) -> bool,
    {
        self.map.range(f, &self.guard)
    }

    /// Returns the number of entries in the map.
    /// See also [`SyncMap::len`].
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    /// See also [`SyncMap::is_empty`].
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clears the map, removing all key-value pairs.
    /// See also [`SyncMap::clear`].
    pub fn clear(&self) {
        self.map.clear(&self.guard);
    }
}

impl<K, V, S> SyncMapRef<'_, K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns the value stored for `key`.
    /// See also [`SyncMap::load`].
    pub fn load<'g, Q>(&'g self, key: &Q) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.load(key, &self.guard)
    }

    /// Tests if `key` is a key in this map.
    /// See also [`SyncMap::contains_key`].
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(key, &self.guard)
    }

    /// Deletes the value for `key`, returning the previous value if the key was present.
    /// See also [`SyncMap::load_and_delete`].
    pub fn load_and_delete<'g, Q>(&'g self, key: &Q) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.load_and_delete(key, &self.guard)
    }

    /// Deletes the value for `key`.
    /// See also [`SyncMap::delete`].
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.delete(key, &self.guard)
    }

    /// Deletes the entry for `key` if its value is equal to `old`.
    /// See also [`SyncMap::compare_and_delete`].
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        self.map.compare_and_delete(key, old, &self.guard)
    }
}

impl<K, V, S> SyncMapRef<'_, K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    /// Stores `value` for `key`.
    /// See also [`SyncMap::store`].
    pub fn store(&self, key: K, value: V) {
        self.map.store(key, value, &self.guard)
    }

    /// Stores `value` for `key`, returning the previous value.
    /// See also [`SyncMap::swap`].
    pub fn swap<'g>(&'g self, key: K, value: V) -> Option<&'g V> {
        self.map.swap(key, value, &self.guard)
    }

    /// Returns the existing value for `key` if present, or stores `value`.
    /// See also [`SyncMap::load_or_store`].
    pub fn load_or_store<'g>(&'g self, key: K, value: V) -> (&'g V, bool) {
        self.map.load_or_store(key, value, &self.guard)
    }

    /// Stores `new` for `key` if the current value is equal to `old`.
    /// See also [`SyncMap::compare_and_swap`].
    pub fn compare_and_swap<'g, Q>(
        &'g self,
        key: &Q,
        old: &V,
        new: V,
    ) -> Result<&'g V, CompareAndSwapError<'g, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        self.map.compare_and_swap(key, old, new, &self.guard)
    }
}

impl<'g, K, V, S> IntoIterator for &'g SyncMapRef<'_, K, V, S> {
    type IntoIter = Iter<'g, K, V>;
    type Item = (&'g K, &'g V);

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter(&self.guard)
    }
}

impl<K, V, S> Debug for SyncMapRef<'_, K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self).finish()
    }
}

impl<K, V, S> Clone for SyncMapRef<'_, K, V, S> {
    fn clone(&self) -> Self {
        self.map.pin()
    }
}

impl<K, V, S> PartialEq for SyncMapRef<'_, K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K, V, S> PartialEq<SyncMap<K, V, S>> for SyncMapRef<'_, K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &SyncMap<K, V, S>) -> bool {
        self.map == other
    }
}

impl<K, V, S> PartialEq<SyncMapRef<'_, K, V, S>> for SyncMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &SyncMapRef<'_, K, V, S>) -> bool {
        self == other.map
    }
}

impl<K, V, S> Eq for SyncMapRef<'_, K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&'_ Q> for SyncMapRef<'_, K, V, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.load(key).expect("no entry found for key")
    }
}
