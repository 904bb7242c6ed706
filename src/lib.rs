//! A concurrent map for read-mostly workloads.
//!
//! [`SyncMap`] is built for two access patterns in particular:
//!
//!  - a key is written once but read many times, as in caches that only ever grow, and
//!  - many threads read, write, and overwrite entries for disjoint sets of keys.
//!
//! In both cases it significantly reduces lock contention compared to a map guarded by a single
//! `Mutex` or `RwLock`.
//!
//! # How it works
//!
//! The map is made up of two halves. The first is an immutable _snapshot_ of the map, which is
//! published through an atomic pointer and replaced wholesale, never modified. Loads of keys in
//! the snapshot never take a lock, and neither do stores to keys that are already in the
//! snapshot: each key maps to a shared entry whose value pointer is updated atomically.
//!
//! The second half is an _overlay_: a plain hash table behind a `Mutex`, which holds the keys that
//! have been stored since the snapshot was taken. A lookup that misses the snapshot while the
//! overlay holds keys it does not know about has to take the lock, and counts as a _miss_. Once
//! the number of misses catches up with the size of the overlay, the overlay is _promoted_: it
//! becomes the next snapshot, and further loads of its keys are lock-free again.
//!
//! Deleting a key that is in the snapshot only clears its entry, so that a later store of the same
//! key can _resurrect_ it without taking the lock. When the overlay is next built from the
//! snapshot, cleared entries are _expunged_ instead of copied over, and are gone with the next
//! promotion.
//!
//! # Consistency
//!
//! Every operation on a single key ([`load`](SyncMap::load), [`store`](SyncMap::store),
//! [`load_or_store`](SyncMap::load_or_store), [`load_and_delete`](SyncMap::load_and_delete) and
//! friends) is linearizable. [`range`](SyncMap::range) and the iterators walk a single snapshot:
//! they never yield a key twice, and reflect the state of the map at some point no earlier than
//! when they were created, but may or may not observe stores and deletes that happen while they
//! run.
//!
//! # A note on `Guard`s
//!
//! Since a value that has been overwritten or deleted may still be in use by another thread, the
//! map cannot free it right away. Instead, it uses [`seize`] to defer reclamation until no thread
//! can still be accessing it. Every operation therefore takes a [`Guard`], obtained from
//! [`SyncMap::guard`], and references returned by the map live only as long as that guard.
//!
//! Holding on to a guard prevents garbage from being collected, so guards should be short-lived.
//! [`SyncMap::pin`] returns a [`SyncMapRef`], which owns a guard and exposes the same operations
//! without the extra argument:
//!
//! ```
//! use syncmap::SyncMap;
//!
//! let map = SyncMap::new();
//! let guard = map.guard();
//! map.store("a", 1, &guard);
//! map.store("b", 2, &guard);
//! assert_eq!(map.load("a", &guard), Some(&1));
//!
//! map.delete("a", &guard);
//! assert_eq!(map.load("a", &guard), None);
//!
//! let map = map.pin();
//! assert_eq!(map.load_or_store("a", 3), (&3, false));
//! assert_eq!(map.load_or_store("a", 4), (&3, true));
//! ```
//!
//! A guard belongs to the map that created it. Passing it to another map is a bug, and causes
//! a panic.
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod entry;
mod map;
mod map_ref;
mod reclaim;

pub mod iter;

#[cfg(feature = "rayon")]
mod rayon_impls;

#[cfg(feature = "serde")]
mod serde_impls;

pub use map::{CompareAndSwapError, SyncMap};
pub use map_ref::SyncMapRef;
pub use seize::Guard;

/// Default hasher for [`SyncMap`].
pub type DefaultHashBuilder = ahash::RandomState;
