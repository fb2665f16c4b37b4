//! Database Engine
//!
//! [`Db`] is the single object every command handler goes through. It owns:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                             Db                               │
//! │                                                              │
//! │   KeyLocks ─── whole-command atomicity over 1..n keys        │
//! │                                                              │
//! │   ShardedMap<Value>     primary keyspace                     │
//! │   ShardedMap<Instant>   TTL index (absolute deadlines)       │
//! │                                                              │
//! │   CommandTable          name -> handler, built once          │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ add / cancel
//!                                 ▼
//!                        TimeWheel (Tokio task)
//! ```
//!
//! ## Expiration
//!
//! Keys with a TTL vanish two ways:
//!
//! - **Active**: setting a TTL schedules a timing wheel job. When it fires it
//!   takes the key's write lock and deletes the key if its recorded deadline
//!   has passed. Tick rounding can fire a job slightly early, in which case it
//!   schedules itself again for the remainder.
//! - **Passive**: every locked accessor checks the deadline first, so a key
//!   past its deadline is never observed, even before its job fires.
//!
//! ## Usage From Handlers
//!
//! A handler acquires the locks for every key it touches, then uses the
//! `*_with_lock` accessors with that guard:
//!
//! ```ignore
//! let guard = db.lock(key);
//! db.update_with_lock(&guard, key, |slot| { /* mutate */ });
//! ```

use crate::commands::CommandTable;
use crate::error::CommandError;
use crate::protocol::Reply;
use crate::storage::locks::{KeyGuard, KeyLocks};
use crate::storage::sharded::ShardedMap;
use crate::storage::timewheel::{TimeWheel, WheelConfig};
use crate::storage::value::Value;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Sizing for a [`Db`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Shards in the keyspace and TTL maps.
    pub shard_count: usize,

    /// Slots in the key lock table.
    pub lock_count: usize,

    /// Timing wheel driving active expiry.
    pub wheel: WheelConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            lock_count: 64,
            wheel: WheelConfig::default(),
        }
    }
}

/// Outcome of checking a key's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// The key has a deadline in the future.
    Fresh,
    /// The deadline had passed; the key has just been deleted.
    Expired,
    /// The key has no deadline (or does not exist).
    Absent,
}

/// State shared with timing wheel jobs.
struct Keyspace {
    data: ShardedMap<Value>,
    ttl: ShardedMap<Instant>,
    locks: KeyLocks,
    expired: AtomicU64,
}

impl Keyspace {
    fn deadline(&self, guard: &KeyGuard<'_>, key: &[u8]) -> Option<Instant> {
        self.ttl.get_with_lock(guard, key, |at| at.copied())
    }

    fn purge(&self, guard: &KeyGuard<'_>, key: &[u8]) {
        self.ttl.del_with_lock(guard, key);
        if self.data.del_with_lock(guard, key).is_some() {
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn check_ttl(&self, guard: &KeyGuard<'_>, key: &[u8]) -> TtlStatus {
        match self.deadline(guard, key) {
            None => TtlStatus::Absent,
            Some(at) if Instant::now() < at => TtlStatus::Fresh,
            Some(_) => {
                self.purge(guard, key);
                debug!(key = %String::from_utf8_lossy(key), "Expired key removed on access");
                TtlStatus::Expired
            }
        }
    }

    /// Timer entry point: deletes `key` if its deadline has passed, otherwise
    /// hands the remaining time to `reschedule` while still holding the lock.
    fn expire_if_due(&self, key: &Bytes, reschedule: impl FnOnce(Duration)) {
        let guard = self.locks.lock(key);
        let Some(deadline) = self.deadline(&guard, key) else {
            return;
        };

        let now = Instant::now();
        if now >= deadline {
            self.purge(&guard, key);
            debug!(key = %String::from_utf8_lossy(key), "Expired key removed by timer");
        } else {
            reschedule(deadline - now);
        }
    }
}

/// Registers the timing wheel job that actively expires `key`.
fn schedule_expiry(wheel: &TimeWheel, keyspace: Weak<Keyspace>, key: Bytes, delay: Duration) {
    let handle = wheel.clone();
    let job_key = key.clone();

    wheel.add(key, delay, move || {
        let Some(keyspace) = keyspace.upgrade() else {
            return;
        };
        let weak = Arc::downgrade(&keyspace);
        keyspace.expire_if_due(&job_key, |remaining| {
            schedule_expiry(&handle, weak, job_key.clone(), remaining);
        });
    });
}

/// The database: keyspace, TTLs, key locks and command table.
///
/// Must be created inside a Tokio runtime, which hosts the timing wheel.
pub struct Db {
    keyspace: Arc<Keyspace>,
    wheel: TimeWheel,
    commands: CommandTable,
}

impl Db {
    /// Creates a database and starts its timing wheel.
    pub fn new(config: DbConfig) -> Self {
        let keyspace = Arc::new(Keyspace {
            data: ShardedMap::new(config.shard_count),
            ttl: ShardedMap::new(config.shard_count),
            locks: KeyLocks::new(config.lock_count),
            expired: AtomicU64::new(0),
        });

        info!(
            shards = keyspace.data.shard_count(),
            locks = keyspace.locks.len(),
            "Database initialized"
        );

        Self {
            keyspace,
            wheel: TimeWheel::start(config.wheel),
            commands: CommandTable::new(),
        }
    }

    // ========================================================================
    // Key locks
    // ========================================================================

    /// Write-locks a single key.
    pub fn lock(&self, key: &[u8]) -> KeyGuard<'_> {
        self.keyspace.locks.lock(key)
    }

    /// Read-locks a single key.
    pub fn rlock(&self, key: &[u8]) -> KeyGuard<'_> {
        self.keyspace.locks.rlock(key)
    }

    /// Write-locks every key, deadlock-free.
    pub fn lock_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> KeyGuard<'_> {
        self.keyspace.locks.lock_all(keys)
    }

    /// Read-locks every key, deadlock-free.
    pub fn rlock_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> KeyGuard<'_> {
        self.keyspace.locks.rlock_all(keys)
    }

    /// Read-locks `read_keys` and write-locks `write_keys` in one ordered pass.
    pub fn rw_lock<R, W>(&self, read_keys: &[R], write_keys: &[W]) -> KeyGuard<'_>
    where
        R: AsRef<[u8]>,
        W: AsRef<[u8]>,
    {
        self.keyspace.locks.rw_lock(read_keys, write_keys)
    }

    // ========================================================================
    // Caller-locked value access
    // ========================================================================

    /// Runs `f` on the live value under `key`.
    ///
    /// `f` must not call back into the database.
    pub fn get_with_lock<R>(
        &self,
        guard: &KeyGuard<'_>,
        key: &[u8],
        f: impl FnOnce(Option<&Value>) -> R,
    ) -> R {
        self.check_ttl(guard, key);
        self.keyspace.data.get_with_lock(guard, key, f)
    }

    /// Whether `key` holds a live value.
    pub fn exists_with_lock(&self, guard: &KeyGuard<'_>, key: &[u8]) -> bool {
        self.get_with_lock(guard, key, |value| value.is_some())
    }

    /// Gives `f` the slot for `key` to read, create, modify or clear.
    ///
    /// A list, set or hash left empty is deleted along with its TTL, and so
    /// is a slot cleared to `None`. `f` must not call back into the database.
    pub fn update_with_lock<R>(
        &self,
        guard: &KeyGuard<'_>,
        key: &Bytes,
        f: impl FnOnce(&mut Option<Value>) -> R,
    ) -> R {
        self.check_ttl(guard, key);

        let (result, removed) = self.keyspace.data.update_with_lock(guard, key, |slot| {
            let existed = slot.is_some();
            let result = f(slot);
            if slot.as_ref().is_some_and(Value::is_empty_aggregate) {
                *slot = None;
            }
            (result, existed && slot.is_none())
        });

        if removed {
            self.cancel_ttl(guard, key);
        }
        result
    }

    /// Stores `value` under `key`, keeping any TTL the key already has.
    ///
    /// An empty list, set or hash deletes the key instead.
    pub fn set_with_lock(&self, guard: &KeyGuard<'_>, key: Bytes, value: Value) {
        if value.is_empty_aggregate() {
            self.del_with_lock(guard, &key);
            return;
        }
        self.check_ttl(guard, &key);
        self.keyspace.data.set_with_lock(guard, key, value);
    }

    /// Deletes `key` and its TTL, returning whether it existed.
    pub fn del_with_lock(&self, guard: &KeyGuard<'_>, key: &[u8]) -> bool {
        self.take_with_lock(guard, key).is_some()
    }

    /// Removes `key` and its TTL, returning the value it held.
    pub fn take_with_lock(&self, guard: &KeyGuard<'_>, key: &[u8]) -> Option<Value> {
        self.check_ttl(guard, key);
        let value = self.keyspace.data.del_with_lock(guard, key);
        if value.is_some() {
            self.cancel_ttl(guard, key);
        }
        value
    }

    // ========================================================================
    // TTL
    // ========================================================================

    /// Expires `key` after `ttl`, replacing any previous TTL.
    ///
    /// # Returns
    ///
    /// `false` if the key does not exist or the deadline is not representable.
    pub fn set_ttl(&self, guard: &KeyGuard<'_>, key: &Bytes, ttl: Duration) -> bool {
        if !self.exists_with_lock(guard, key) {
            return false;
        }
        let Some(deadline) = Instant::now().checked_add(ttl) else {
            return false;
        };

        self.keyspace.ttl.set_with_lock(guard, key.clone(), deadline);
        schedule_expiry(
            &self.wheel,
            Arc::downgrade(&self.keyspace),
            key.clone(),
            ttl,
        );

        trace!(
            key = %String::from_utf8_lossy(key),
            ttl_ms = ttl.as_millis() as u64,
            "TTL set"
        );
        true
    }

    /// Removes the TTL for `key`, returning whether one was set.
    pub fn cancel_ttl(&self, guard: &KeyGuard<'_>, key: &[u8]) -> bool {
        let had_ttl = self.keyspace.ttl.del_with_lock(guard, key).is_some();
        if had_ttl {
            self.wheel.cancel(Bytes::copy_from_slice(key));
        }
        had_ttl
    }

    /// Checks the deadline of `key`, deleting the key if it has passed.
    ///
    /// Purging under a read key lock is sound: the shard latch serializes map
    /// access and the key count only moves on an actual removal.
    pub fn check_ttl(&self, guard: &KeyGuard<'_>, key: &[u8]) -> TtlStatus {
        let status = self.keyspace.check_ttl(guard, key);
        if status == TtlStatus::Expired {
            self.wheel.cancel(Bytes::copy_from_slice(key));
        }
        status
    }

    /// Time left before `key` expires, or `None` if it has no TTL.
    pub fn ttl_with_lock(&self, guard: &KeyGuard<'_>, key: &[u8]) -> Option<Duration> {
        if self.check_ttl(guard, key) != TtlStatus::Fresh {
            return None;
        }
        self.keyspace
            .deadline(guard, key)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    // ========================================================================
    // Stats and dispatch
    // ========================================================================

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.keyspace.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys removed because their TTL ran out.
    pub fn expired_count(&self) -> u64 {
        self.keyspace.expired.load(Ordering::Relaxed)
    }

    /// Runs the command `name` with `args` (the arguments after the name).
    ///
    /// Unknown commands and handler failures become error replies.
    pub fn dispatch(&self, name: &[u8], args: &[Bytes]) -> Reply {
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();

        let Some(handler) = self.commands.get(&name) else {
            debug!(command = %name, "Unknown command");
            return CommandError::UnknownCommand(name).into();
        };

        trace!(command = %name, args = args.len(), "Dispatching command");
        handler(self, args).unwrap_or_else(Reply::from)
    }

    /// Runs a whole request frame, the command name first.
    pub fn execute(&self, frame: &[Bytes]) -> Reply {
        match frame.split_first() {
            Some((name, args)) => self.dispatch(name, args),
            None => CommandError::UnknownCommand(String::new()).into(),
        }
    }

    /// Stops the timing wheel. Pending expirations still apply passively.
    pub fn shutdown(&self) {
        self.wheel.stop();
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.wheel.stop();
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("keys", &self.len())
            .field("shards", &self.keyspace.data.shard_count())
            .field("locks", &self.keyspace.locks.len())
            .finish()
    }
}
