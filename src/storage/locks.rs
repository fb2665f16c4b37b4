//! Key Lock Table
//!
//! A fixed array of reader/writer locks, indexed by key hash, that command
//! handlers use to make a whole command atomic with respect to the keys it
//! touches. The table is sized independently from the sharded map; by
//! default it has four times as many slots, so unrelated keys rarely contend.
//!
//! ## Deadlock Freedom
//!
//! Multi-key acquisition maps every key to its slot index, removes
//! duplicates and acquires the slots in ascending index order. Two commands
//! that need overlapping slots therefore always queue on the lowest shared
//! slot first, and no cycle can form.
//!
//! ```text
//!   RENAME a b              RENAME b a
//!   slots {3, 9}            slots {9, 3}
//!        │                       │
//!        ▼ sort + dedup          ▼ sort + dedup
//!   lock 3, lock 9          lock 3 (waits), lock 9
//! ```
//!
//! Release is tied to [`KeyGuard`]: dropping the guard releases every slot.

use crate::storage::sharded::{slot_for, table_size};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mode {
    Read,
    Write,
}

enum SlotGuard<'a> {
    Read(#[allow(dead_code)] RwLockReadGuard<'a, ()>),
    Write(#[allow(dead_code)] RwLockWriteGuard<'a, ()>),
}

impl SlotGuard<'_> {
    fn mode(&self) -> Mode {
        match self {
            SlotGuard::Read(_) => Mode::Read,
            SlotGuard::Write(_) => Mode::Write,
        }
    }
}

/// Table of reader/writer locks indexed by key hash.
#[derive(Debug)]
pub struct KeyLocks {
    slots: Box<[RwLock<()>]>,
    mask: usize,
}

impl KeyLocks {
    /// Creates a table with `count` slots, rounded up to a power of two.
    pub fn new(count: usize) -> Self {
        let size = table_size(count);
        Self {
            slots: (0..size).map(|_| RwLock::new(())).collect(),
            mask: size - 1,
        }
    }

    /// Number of lock slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot index guarding `key`.
    #[inline]
    pub fn index_of(&self, key: &[u8]) -> usize {
        slot_for(key, self.mask)
    }

    /// Acquires the write lock for a single key.
    pub fn lock(&self, key: &[u8]) -> KeyGuard<'_> {
        self.acquire(BTreeMap::from([(self.index_of(key), Mode::Write)]))
    }

    /// Acquires the read lock for a single key.
    pub fn rlock(&self, key: &[u8]) -> KeyGuard<'_> {
        self.acquire(BTreeMap::from([(self.index_of(key), Mode::Read)]))
    }

    /// Acquires write locks for every key, in ascending slot order.
    pub fn lock_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> KeyGuard<'_> {
        self.rw_lock::<K, K>(&[], keys)
    }

    /// Acquires read locks for every key, in ascending slot order.
    pub fn rlock_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> KeyGuard<'_> {
        self.rw_lock::<K, K>(keys, &[])
    }

    /// Acquires read locks for `read_keys` and write locks for `write_keys`.
    ///
    /// A slot required by both sets is taken once, in write mode.
    pub fn rw_lock<R, W>(&self, read_keys: &[R], write_keys: &[W]) -> KeyGuard<'_>
    where
        R: AsRef<[u8]>,
        W: AsRef<[u8]>,
    {
        let mut plan = BTreeMap::new();
        for key in read_keys {
            plan.entry(self.index_of(key.as_ref())).or_insert(Mode::Read);
        }
        for key in write_keys {
            plan.insert(self.index_of(key.as_ref()), Mode::Write);
        }
        self.acquire(plan)
    }

    fn acquire(&self, plan: BTreeMap<usize, Mode>) -> KeyGuard<'_> {
        // BTreeMap iterates in ascending key order.
        let held = plan
            .into_iter()
            .map(|(index, mode)| {
                let slot = &self.slots[index];
                let guard = match mode {
                    Mode::Read => {
                        SlotGuard::Read(slot.read().unwrap_or_else(PoisonError::into_inner))
                    }
                    Mode::Write => {
                        SlotGuard::Write(slot.write().unwrap_or_else(PoisonError::into_inner))
                    }
                };
                (index, guard)
            })
            .collect();

        KeyGuard { table: self, held }
    }
}

/// Proof that a set of key-lock slots is held.
///
/// Storage accessors that operate "with lock" take a `&KeyGuard` and check
/// (in debug builds) that it covers the key being accessed. Dropping the
/// guard releases all slots.
pub struct KeyGuard<'a> {
    table: &'a KeyLocks,
    /// Held slots, sorted by index.
    held: Vec<(usize, SlotGuard<'a>)>,
}

impl KeyGuard<'_> {
    fn find(&self, key: &[u8]) -> Option<Mode> {
        let index = self.table.index_of(key);
        self.held
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| self.held[pos].1.mode())
    }

    /// Whether this guard holds the slot for `key`, in any mode.
    pub fn covers(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Whether this guard holds the slot for `key` in write mode.
    pub fn covers_for_write(&self, key: &[u8]) -> bool {
        self.find(key) == Some(Mode::Write)
    }

    /// Slot indices held, in acquisition order.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.held.iter().map(|(i, _)| *i)
    }

    /// Releases every held slot.
    pub fn unlock(self) {
        drop(self);
    }
}

impl std::fmt::Debug for KeyGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.held.iter().map(|(i, g)| (i, g.mode())))
            .finish()
    }
}
