use crate::entry::Entry;
use crate::map::Table;
use crate::reclaim::Guard;
use std::collections::hash_map;
use std::sync::Arc;

/// An iterator over a map's entries.
///
/// See [`SyncMap::iter`](crate::SyncMap::iter) for details.
pub struct Iter<'g, K, V> {
    entries: Option<hash_map::Iter<'g, K, Arc<Entry<V>>>>,
    guard: &'g Guard<'g>,
}

impl<'g, K, V> Iter<'g, K, V> {
    pub(crate) fn new<S>(table: Option<&'g Table<K, V, S>>, guard: &'g Guard<'g>) -> Self {
        Self {
            entries: table.map(|table| table.iter()),
            guard,
        }
    }
}

impl<'g, K, V> Iterator for Iter<'g, K, V> {
    type Item = (&'g K, &'g V);
    fn next(&mut self) -> Option<Self::Item> {
        let guard = self.guard;
        // deleted and expunged entries are still part of the snapshot, but not of the map
        self.entries
            .as_mut()?
            .find_map(|(key, entry)| entry.load(guard).map(|value| (key, value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.entries {
            Some(ref entries) => (0, entries.size_hint().1),
            None => (0, Some(0)),
        }
    }
}

/// An iterator over a map's keys.
///
/// See [`SyncMap::keys`](crate::SyncMap::keys) for details.
pub struct Keys<'g, K, V> {
    pub(crate) iter: Iter<'g, K, V>,
}

impl<'g, K, V> Iterator for Keys<'g, K, V> {
    type Item = &'g K;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(key, _)| key)
    }
}

/// An iterator over a map's values.
///
/// See [`SyncMap::values`](crate::SyncMap::values) for details.
pub struct Values<'g, K, V> {
    pub(crate) iter: Iter<'g, K, V>,
}

impl<'g, K, V> Iterator for Values<'g, K, V> {
    type Item = &'g V;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(_, value)| value)
    }
}
