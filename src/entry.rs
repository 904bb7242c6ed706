use crate::reclaim::{Atomic, Guard, Linked, RetireShared, Shared};
use std::sync::atomic::Ordering;

/// A slot that holds at most one value for a key.
///
/// The same `Entry` is shared between the read-only snapshot and the overlay, so a write through
/// either side is immediately visible through the other.
///
/// The pointer encodes one of three states (see [`Slot`]):
///
///  - a live pointer: the entry is present.
///  - null: the entry was deleted, but is still reachable from the snapshot and may be
///    resurrected by a later store without taking the overlay lock.
///  - the expunged marker: the entry was deleted and is absent from the overlay. it will not be
///    carried into the next snapshot, so a store must go through the overlay lock to re-add it.
pub(crate) struct Entry<V> {
    p: Atomic<V>,
}

// values are handed out by reference to any thread, and dropped by whichever thread reclaims them
unsafe impl<V> Send for Entry<V> where V: Send + Sync {}

unsafe impl<V> Sync for Entry<V> where V: Send + Sync {}

/// The decoded state of an [`Entry`].
pub(crate) enum Slot<'g, V> {
    Present(Shared<'g, V>),
    Deleted,
    Expunged,
}

impl<'g, V> Slot<'g, V> {
    fn decode(p: Shared<'g, V>) -> Self {
        if p.is_null() {
            Slot::Deleted
        } else if p == Shared::dangling() {
            Slot::Expunged
        } else {
            Slot::Present(p)
        }
    }
}

/// Returned when a lock-free write finds the entry expunged.
///
/// The write must then be retried under the overlay lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Expunged;

/// Dereferences a present value.
///
/// safety: every value pointer stored in an entry was allocated by the map's collector, and is
/// only ever retired through a guard. the caller holds a guard from that collector for `'g`.
fn value<'g, V>(p: Shared<'g, V>) -> &'g V {
    let linked: &'g Linked<V> = unsafe { p.deref() };
    &**linked
}

impl<V> Entry<V> {
    #[cfg(test)]
    pub(crate) fn new(value: V, collector: &crate::reclaim::Collector) -> Self {
        Self::from_shared(Shared::boxed(value, collector))
    }

    pub(crate) fn from_shared(value: Shared<'_, V>) -> Self {
        Self {
            p: Atomic::from(value),
        }
    }

    pub(crate) fn state<'g>(&self, guard: &'g Guard<'_>) -> Slot<'g, V> {
        Slot::decode(self.p.load(Ordering::Acquire, guard))
    }

    pub(crate) fn load<'g>(&self, guard: &'g Guard<'_>) -> Option<&'g V> {
        match self.state(guard) {
            Slot::Present(p) => Some(value(p)),
            Slot::Deleted | Slot::Expunged => None,
        }
    }

    #[inline]
    fn cas<'g>(&self, current: Shared<'_, V>, new: Shared<'g, V>, guard: &'g Guard<'_>) -> bool {
        self.p
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
    }

    /// Retires the value `old` was pointing to, if any, and returns a reference to it that
    /// stays valid for as long as `guard` lives.
    fn retire<'g>(old: Shared<'g, V>, guard: &'g Guard<'_>) -> Option<&'g V> {
        match Slot::decode(old) {
            Slot::Present(p) => {
                let v = value(p);
                // safety: `old` was just unlinked from this entry by the calling thread, so no
                // thread that starts an operation from here on can reach it. threads that already
                // read it are holding guards, and seize will not free it until they are gone.
                unsafe { guard.retire_shared(p) };
                Some(v)
            }
            Slot::Deleted | Slot::Expunged => None,
        }
    }

    /// Stores `new` unless the entry has been expunged.
    ///
    /// A deleted entry is resurrected in place. Returns `false` if the entry is expunged, in which
    /// case `new` is left untouched and the caller still owns it.
    #[cfg(test)]
    pub(crate) fn try_store<'g>(&self, new: Shared<'g, V>, guard: &'g Guard<'_>) -> bool {
        self.try_swap(new, guard).is_ok()
    }

    /// Like `try_store`, but hands back the value that was replaced.
    pub(crate) fn try_swap<'g>(
        &self,
        new: Shared<'g, V>,
        guard: &'g Guard<'_>,
    ) -> Result<Option<&'g V>, Expunged> {
        let mut current = self.p.load(Ordering::Acquire, guard);
        loop {
            if let Slot::Expunged = Slot::decode(current) {
                return Err(Expunged);
            }
            match self.p.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return Ok(Self::retire(current, guard)),
                Err(changed) => current = changed.current,
            }
        }
    }

    /// Clears the expunged marker, turning the entry into a deleted one.
    ///
    /// Must be called with the overlay lock held. If this returns `true`, the entry was expunged,
    /// which means it is absent from the overlay and must be added back to it before the lock is
    /// released.
    pub(crate) fn unexpunge_locked<'g>(&self, guard: &'g Guard<'_>) -> bool {
        self.cas(Shared::dangling(), Shared::null(), guard)
    }

    /// Unconditionally stores `new` and returns the previous value.
    ///
    /// The entry must not be expunged, which holds while the overlay lock is held and
    /// `unexpunge_locked` has been called.
    pub(crate) fn swap_locked<'g>(&self, new: Shared<'g, V>, guard: &'g Guard<'_>) -> Option<&'g V> {
        let old = self.p.swap(new, Ordering::AcqRel, guard);
        debug_assert!(
            !matches!(Slot::decode(old), Slot::Expunged),
            "stored into an expunged entry"
        );
        Self::retire(old, guard)
    }

    /// Atomically loads the present value, or stores `new` if the entry is deleted.
    ///
    /// Returns `Ok((value, loaded))` on success. If a value was loaded, `new` is freed. If the
    /// entry is expunged, `new` is handed back untouched.
    pub(crate) fn try_load_or_store<'g>(
        &self,
        new: Shared<'g, V>,
        guard: &'g Guard<'_>,
    ) -> Result<(&'g V, bool), Shared<'g, V>> {
        loop {
            match self.state(guard) {
                Slot::Expunged => return Err(new),
                Slot::Present(p) => {
                    // safety: `new` was never published, so we are its only owner.
                    drop(unsafe { new.into_box() });
                    return Ok((value(p), true));
                }
                Slot::Deleted => {
                    if self.cas(Shared::null(), new, guard) {
                        return Ok((value(new), false));
                    }
                }
            }
        }
    }

    /// Logically deletes the entry, returning the value it held.
    pub(crate) fn delete<'g>(&self, guard: &'g Guard<'_>) -> Option<&'g V> {
        let mut current = self.p.load(Ordering::Acquire, guard);
        loop {
            match Slot::decode(current) {
                Slot::Deleted | Slot::Expunged => return None,
                Slot::Present(_) => {}
            }
            match self.p.compare_exchange(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return Self::retire(current, guard),
                Err(changed) => current = changed.current,
            }
        }
    }

    /// Marks a deleted entry as expunged.
    ///
    /// Must be called with the overlay lock held, while copying the snapshot into a fresh
    /// overlay. Returns `true` if the entry is (now) expunged and must be left out of the overlay.
    pub(crate) fn try_expunge_locked<'g>(&self, guard: &'g Guard<'_>) -> bool {
        let mut current = self.p.load(Ordering::Acquire, guard);
        while current.is_null() {
            match self.p.compare_exchange(
                current,
                Shared::dangling(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(changed) => current = changed.current,
            }
        }
        matches!(Slot::decode(current), Slot::Expunged)
    }

    /// Expunges the entry regardless of its state, retiring the value it held.
    ///
    /// Used when the map is cleared: the entry is about to become unreachable from both the
    /// snapshot and the overlay.
    pub(crate) fn expunge<'g>(&self, guard: &'g Guard<'_>) -> Option<&'g V> {
        let old = self.p.swap(Shared::dangling(), Ordering::AcqRel, guard);
        Self::retire(old, guard)
    }
}

impl<V: PartialEq> Entry<V> {
    /// Replaces the value with `new` if it currently equals `old`.
    ///
    /// On failure `new` is handed back untouched, together with the value that was observed.
    pub(crate) fn try_compare_and_swap<'g>(
        &self,
        old: &V,
        new: Shared<'g, V>,
        guard: &'g Guard<'_>,
    ) -> Result<&'g V, (Option<&'g V>, Shared<'g, V>)> {
        let mut current = self.p.load(Ordering::Acquire, guard);
        loop {
            let p = match Slot::decode(current) {
                Slot::Present(p) if value(p) == old => p,
                Slot::Present(p) => return Err((Some(value(p)), new)),
                Slot::Deleted | Slot::Expunged => return Err((None, new)),
            };
            match self.p.compare_exchange(
                p,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    Self::retire(p, guard);
                    return Ok(value(new));
                }
                Err(changed) => current = changed.current,
            }
        }
    }

    /// Deletes the entry if its value currently equals `old`.
    pub(crate) fn compare_and_delete<'g>(&self, old: &V, guard: &'g Guard<'_>) -> bool {
        let mut current = self.p.load(Ordering::Acquire, guard);
        loop {
            let p = match Slot::decode(current) {
                Slot::Present(p) if value(p) == old => p,
                _ => return false,
            };
            match self.p.compare_exchange(
                p,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    Self::retire(p, guard);
                    return true;
                }
                Err(changed) => current = changed.current,
            }
        }
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        // an entry is dropped either together with the whole map, or when the last snapshot
        // or overlay referencing it goes away. in the latter case the entry has already been
        // expunged (it was left out of the overlay that became the next snapshot, or the map was
        // cleared), so there is nothing left that a reader could be borrowing.
        let p = self.p.get_mut();
        if let Slot::Present(p) = Slot::decode(p) {
            // safety: we have &mut self, and present values are only reachable through this entry.
            drop(unsafe { p.into_box() });
        }
    }
}
