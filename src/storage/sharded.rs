//! Sharded Concurrent Map
//!
//! A fixed-size array of independently locked hash maps. This is the container
//! behind both the primary keyspace and the TTL index.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ShardedMap<V>                          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐        ┌─────────┐      │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │  ...   │ Shard N │      │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │        │ RwLock  │      │
//! │  │ HashMap │ │ HashMap │ │ HashMap │        │ HashMap │      │
//! │  └─────────┘ └─────────┘ └─────────┘        └─────────┘      │
//! │                       count: AtomicUsize                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The shard for a key is `fnv1a(key) & (N - 1)`, so the shard count is always
//! rounded up to a power of two (minimum 16).
//!
//! ## Two Access Modes
//!
//! 1. **Self-locking** (`get`, `set`, `del`): each call is its own critical
//!    section. Suitable for independent single operations.
//! 2. **Caller-locked** (`get_with_lock`, `set_with_lock`, `del_with_lock`,
//!    `update_with_lock`): the caller already holds the key's slot in the
//!    [`KeyLocks`](crate::storage::KeyLocks) table and proves it by passing the
//!    [`KeyGuard`]. Atomicity of a whole command comes from that guard.
//!
//! Several key-lock slots map onto the same shard, so even the caller-locked
//! accessors take the shard latch for the duration of the single map access.
//! The latch protects the `HashMap` structure only; it is never held across
//! two accesses and never exposed to command handlers.

use crate::storage::locks::KeyGuard;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Smallest table size handed out by [`table_size`].
pub const MIN_TABLE_SIZE: usize = 16;

/// Largest table size handed out by [`table_size`].
pub const MAX_TABLE_SIZE: usize = 1 << 24;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a key.
///
/// Shared by the sharded map and the key lock table so both agree on how a
/// key spreads, even though they mask it to different widths.
#[inline]
pub fn fnv1a(key: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in key {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Rounds a requested shard/lock count up to the next power of two.
///
/// The result is at least [`MIN_TABLE_SIZE`], so `hash & (size - 1)` is always
/// a valid substitute for `hash % size`.
pub fn table_size(requested: usize) -> usize {
    requested
        .clamp(MIN_TABLE_SIZE, MAX_TABLE_SIZE)
        .next_power_of_two()
}

/// Maps a key onto a table of `mask + 1` slots.
#[inline]
pub(crate) fn slot_for(key: &[u8], mask: usize) -> usize {
    fnv1a(key) as usize & mask
}

/// One independently locked partition of the map.
#[derive(Debug)]
struct Shard<V> {
    map: RwLock<HashMap<Bytes, V>>,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    // A panic while a shard latch is held cannot leave the HashMap itself in a
    // torn state, so a poisoned latch is simply reclaimed.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, V>> {
        self.map.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, V>> {
        self.map.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed-size array of independently locked hash maps.
///
/// # Example
///
/// ```
/// use wheelkv::storage::ShardedMap;
/// use bytes::Bytes;
///
/// let map: ShardedMap<u64> = ShardedMap::new(16);
/// assert!(map.set(Bytes::from("visits"), 1));
/// assert_eq!(map.get(b"visits"), Some(1));
/// assert!(map.del(b"visits"));
/// assert_eq!(map.len(), 0);
/// ```
pub struct ShardedMap<V> {
    shards: Box<[Shard<V>]>,
    mask: usize,
    /// Best-effort total entry count. Only incremented on a real insert and
    /// only decremented on a real removal, so it never underflows.
    count: AtomicUsize,
}

impl<V> std::fmt::Debug for ShardedMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shards", &self.shards.len())
            .field("count", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V> ShardedMap<V> {
    /// Creates a map with `shard_count` rounded up by [`table_size`].
    pub fn new(shard_count: usize) -> Self {
        let size = table_size(shard_count);
        let shards = (0..size).map(|_| Shard::new()).collect();

        Self {
            shards,
            mask: size - 1,
            count: AtomicUsize::new(0),
        }
    }

    /// Number of shards actually allocated.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Approximate number of entries across all shards.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the shard a key lives in.
    #[inline]
    pub fn shard_index(&self, key: &[u8]) -> usize {
        slot_for(key, self.mask)
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard<V> {
        &self.shards[self.shard_index(key)]
    }

    #[inline]
    fn note_insert(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn note_remove(&self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    // ========================================================================
    // Self-locking mode
    // ========================================================================

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).read().get(key).cloned()
    }

    /// Checks whether `key` is present.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// # Returns
    ///
    /// `true` if the key was not present before.
    pub fn set(&self, key: Bytes, value: V) -> bool {
        let is_new = self.shard(&key).write().insert(key, value).is_none();
        if is_new {
            self.note_insert();
        }
        is_new
    }

    /// Removes `key`, returning whether it existed.
    pub fn del(&self, key: &[u8]) -> bool {
        let existed = self.shard(key).write().remove(key).is_some();
        if existed {
            self.note_remove();
        }
        existed
    }

    // ========================================================================
    // Caller-locked mode
    // ========================================================================

    /// Runs `f` against the value stored under `key`.
    ///
    /// `f` runs while the shard latch is held and must not call back into
    /// this map.
    pub fn get_with_lock<R>(
        &self,
        guard: &KeyGuard<'_>,
        key: &[u8],
        f: impl FnOnce(Option<&V>) -> R,
    ) -> R {
        debug_assert!(guard.covers(key), "key accessed without its key lock");
        let map = self.shard(key).read();
        f(map.get(key))
    }

    /// Inserts or replaces the value for `key`, returning the previous value.
    pub fn set_with_lock(&self, guard: &KeyGuard<'_>, key: Bytes, value: V) -> Option<V> {
        debug_assert!(guard.covers(&key), "key accessed without its key lock");
        let previous = self.shard(&key).write().insert(key, value);
        if previous.is_none() {
            self.note_insert();
        }
        previous
    }

    /// Removes `key`, returning the value it held.
    pub fn del_with_lock(&self, guard: &KeyGuard<'_>, key: &[u8]) -> Option<V> {
        debug_assert!(guard.covers(key), "key accessed without its key lock");
        let removed = self.shard(key).write().remove(key);
        if removed.is_some() {
            self.note_remove();
        }
        removed
    }

    /// Gives `f` mutable access to the slot for `key`.
    ///
    /// The slot is `None` when the key is absent. Leaving `Some` in it stores
    /// the value; leaving `None` removes the key. `f` runs while the shard
    /// latch is held and must not call back into this map.
    pub fn update_with_lock<R>(
        &self,
        guard: &KeyGuard<'_>,
        key: &Bytes,
        f: impl FnOnce(&mut Option<V>) -> R,
    ) -> R {
        debug_assert!(guard.covers(key), "key accessed without its key lock");
        let mut map = self.shard(key).write();

        let mut slot = map.remove(key.as_ref());
        let existed = slot.is_some();
        let result = f(&mut slot);

        match slot {
            Some(value) => {
                map.insert(key.clone(), value);
                if !existed {
                    self.note_insert();
                }
            }
            None if existed => self.note_remove(),
            None => {}
        }

        result
    }
}
