//! Keyspace commands: deletion, existence, expiry, renaming and type.

use super::{arity, expire_duration, min_arity, parse_int, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::Db;
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(super) fn register(table: &mut CommandTable) {
    table.register("del", del);
    table.register("exists", exists);
    table.register("ttl", ttl);
    table.register("pttl", pttl);
    table.register("expire", expire);
    table.register("pexpire", pexpire);
    table.register("expireat", expireat);
    table.register("persist", persist);
    table.register("rename", rename);
    table.register("renamenx", renamenx);
    table.register("type", key_type);
    table.register("dbsize", dbsize);
}

/// DEL key [key ...]
///
/// All keys are deleted under one lock acquisition.
pub fn del(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 1, "del")?;
    let guard = db.lock_all(args);
    let removed = args
        .iter()
        .filter(|key| db.del_with_lock(&guard, key))
        .count();
    Ok(Reply::count(removed))
}

/// EXISTS key [key ...]
///
/// A key named more than once is counted each time.
pub fn exists(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 1, "exists")?;
    let guard = db.rlock_all(args);
    let found = args
        .iter()
        .filter(|key| db.exists_with_lock(&guard, key))
        .count();
    Ok(Reply::count(found))
}

/// Remaining lifetime of a key: `-2` if absent, `-1` without TTL.
fn remaining(db: &Db, key: &[u8]) -> Result<Duration, i64> {
    let guard = db.rlock(key);
    if !db.exists_with_lock(&guard, key) {
        return Err(-2);
    }
    db.ttl_with_lock(&guard, key).ok_or(-1)
}

/// TTL key
pub fn ttl(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "ttl")?;
    Ok(match remaining(db, &args[0]) {
        // Rounded to the nearest second.
        Ok(left) => Reply::integer(((left.as_millis() + 500) / 1000) as i64),
        Err(code) => Reply::integer(code),
    })
}

/// PTTL key
pub fn pttl(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "pttl")?;
    Ok(match remaining(db, &args[0]) {
        Ok(left) => Reply::integer(left.as_millis() as i64),
        Err(code) => Reply::integer(code),
    })
}

/// Applies a TTL, or deletes the key when the deadline is already past.
fn apply_expire(db: &Db, key: &Bytes, ttl: Option<Duration>) -> CommandResult<Reply> {
    let guard = db.lock(key);
    if !db.exists_with_lock(&guard, key) {
        return Ok(Reply::integer(0));
    }

    match ttl {
        Some(ttl) => db.set_ttl(&guard, key, ttl),
        None => db.del_with_lock(&guard, key),
    };
    Ok(Reply::integer(1))
}

/// Relative expire shared by EXPIRE and PEXPIRE.
fn expire_relative(
    db: &Db,
    args: &[Bytes],
    in_seconds: bool,
    name: &'static str,
) -> CommandResult<Reply> {
    arity(args, 2, name)?;
    let amount = parse_int(&args[1])?;
    let ttl = if amount <= 0 {
        None
    } else {
        Some(expire_duration(amount, in_seconds, name)?)
    };
    apply_expire(db, &args[0], ttl)
}

/// EXPIRE key seconds
pub fn expire(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    expire_relative(db, args, true, "expire")
}

/// PEXPIRE key milliseconds
pub fn pexpire(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    expire_relative(db, args, false, "pexpire")
}

/// EXPIREAT key unix-seconds
pub fn expireat(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "expireat")?;
    let at = parse_int(&args[1])?;
    let at_ms = at
        .checked_mul(1000)
        .ok_or(CommandError::InvalidExpire("expireat"))?;

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let ttl = match at_ms.saturating_sub(now_ms) {
        left if left <= 0 => None,
        left => Some(expire_duration(left, false, "expireat")?),
    };
    apply_expire(db, &args[0], ttl)
}

/// PERSIST key
pub fn persist(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "persist")?;
    let key = &args[0];
    let guard = db.lock(key);
    let removed = db.exists_with_lock(&guard, key) && db.cancel_ttl(&guard, key);
    Ok(Reply::integer(removed.into()))
}

/// Moves `src` to `dst` with its remaining TTL. Caller holds both locks.
fn move_key(db: &Db, guard: &crate::storage::KeyGuard<'_>, src: &Bytes, dst: &Bytes) {
    let left = db.ttl_with_lock(guard, src);
    let Some(value) = db.take_with_lock(guard, src) else {
        return;
    };

    db.del_with_lock(guard, dst);
    db.set_with_lock(guard, dst.clone(), value);
    if let Some(left) = left {
        db.set_ttl(guard, dst, left);
    }
}

/// RENAME key newkey
pub fn rename(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "rename")?;
    let (src, dst) = (&args[0], &args[1]);

    let guard = db.lock_all(args);
    if !db.exists_with_lock(&guard, src) {
        return Err(CommandError::NoSuchKey);
    }
    if src != dst {
        move_key(db, &guard, src, dst);
    }
    Ok(Reply::ok())
}

/// RENAMENX key newkey
pub fn renamenx(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "renamenx")?;
    let (src, dst) = (&args[0], &args[1]);

    let guard = db.lock_all(args);
    if !db.exists_with_lock(&guard, src) {
        return Err(CommandError::NoSuchKey);
    }
    if src == dst || db.exists_with_lock(&guard, dst) {
        return Ok(Reply::integer(0));
    }
    move_key(db, &guard, src, dst);
    Ok(Reply::integer(1))
}

/// TYPE key
pub fn key_type(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "type")?;
    let key = &args[0];
    let guard = db.rlock(key);
    let name = db.get_with_lock(&guard, key, |value| {
        value.map_or("none", |v| v.kind().name())
    });
    Ok(Reply::simple(name))
}

/// DBSIZE
pub fn dbsize(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 0, "dbsize")?;
    Ok(Reply::count(db.len()))
}
