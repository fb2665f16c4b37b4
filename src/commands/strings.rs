//! String, counter and bitmap commands.

use super::{
    arity, expire_duration, format_float, min_arity, parse_float, parse_int, CommandTable,
};
use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::{Db, KeyGuard, Value};
use crate::types::bitmap::{self, BitOp};
use bytes::Bytes;

/// Largest string value (512MB).
pub const MAX_STRING_LEN: usize = 512 * 1024 * 1024;

pub(super) fn register(table: &mut CommandTable) {
    table.register("set", set);
    table.register("setnx", setnx);
    table.register("setex", setex);
    table.register("psetex", psetex);
    table.register("get", get);
    table.register("getset", getset);
    table.register("mset", mset);
    table.register("msetnx", msetnx);
    table.register("mget", mget);
    table.register("incr", incr);
    table.register("incrby", incrby);
    table.register("incrbyfloat", incrbyfloat);
    table.register("decr", decr);
    table.register("decrby", decrby);
    table.register("strlen", strlen);
    table.register("append", append);
    table.register("setrange", setrange);
    table.register("getrange", getrange);
    table.register("setbit", setbit);
    table.register("getbit", getbit);
    table.register("bitcount", bitcount);
    table.register("bitop", bitop);
}

// ============================================================================
// Helpers
// ============================================================================

/// Reads a string value. Absent keys read as `None`.
fn read_string(db: &Db, guard: &KeyGuard<'_>, key: &[u8]) -> CommandResult<Option<Bytes>> {
    db.get_with_lock(guard, key, |value| match value {
        None => Ok(None),
        Some(v) => v.as_string().map(|s| Some(Bytes::copy_from_slice(s))),
    })
}

/// Replaces the value of `key` with a string, keeping any TTL.
fn store_string(db: &Db, guard: &KeyGuard<'_>, key: &Bytes, value: &[u8]) {
    db.set_with_lock(guard, key.clone(), Value::String(value.to_vec()));
}

/// The string in `slot`, created empty if the key is absent.
fn string_slot(slot: &mut Option<Value>) -> CommandResult<&mut Vec<u8>> {
    slot.get_or_insert_with(|| Value::String(Vec::new()))
        .as_string_mut()
}

fn check_len(len: usize) -> CommandResult<()> {
    if len > MAX_STRING_LEN {
        Err(CommandError::StringTooLong)
    } else {
        Ok(())
    }
}

// ============================================================================
// SET family
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    Always,
    IfAbsent,
    IfPresent,
}

/// SET key value [NX|XX] [EX seconds|PX milliseconds]
pub fn set(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "set")?;
    let (key, value) = (&args[0], &args[1]);

    let mut condition = Condition::Always;
    let mut ttl = None;

    let mut options = args[2..].iter();
    while let Some(option) = options.next() {
        match option.to_ascii_uppercase().as_slice() {
            b"NX" if condition != Condition::IfPresent => condition = Condition::IfAbsent,
            b"XX" if condition != Condition::IfAbsent => condition = Condition::IfPresent,
            unit @ (b"EX" | b"PX") if ttl.is_none() => {
                let amount = parse_int(options.next().ok_or(CommandError::Syntax)?)?;
                ttl = Some(expire_duration(amount, unit == b"EX", "set")?);
            }
            _ => return Err(CommandError::Syntax),
        }
    }

    let guard = db.lock(key);
    let exists = db.exists_with_lock(&guard, key);
    match condition {
        Condition::IfAbsent if exists => return Ok(Reply::Null),
        Condition::IfPresent if !exists => return Ok(Reply::Null),
        _ => {}
    }

    store_string(db, &guard, key, value);
    match ttl {
        Some(ttl) => db.set_ttl(&guard, key, ttl),
        None => db.cancel_ttl(&guard, key),
    };
    Ok(Reply::ok())
}

/// SETNX key value
pub fn setnx(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "setnx")?;
    let key = &args[0];
    let guard = db.lock(key);
    if db.exists_with_lock(&guard, key) {
        return Ok(Reply::integer(0));
    }
    store_string(db, &guard, key, &args[1]);
    Ok(Reply::integer(1))
}

fn set_expiring(
    db: &Db,
    args: &[Bytes],
    in_seconds: bool,
    name: &'static str,
) -> CommandResult<Reply> {
    arity(args, 3, name)?;
    let key = &args[0];
    let ttl = expire_duration(parse_int(&args[1])?, in_seconds, name)?;

    let guard = db.lock(key);
    store_string(db, &guard, key, &args[2]);
    db.set_ttl(&guard, key, ttl);
    Ok(Reply::ok())
}

/// SETEX key seconds value
pub fn setex(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    set_expiring(db, args, true, "setex")
}

/// PSETEX key milliseconds value
pub fn psetex(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    set_expiring(db, args, false, "psetex")
}

/// GET key
pub fn get(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "get")?;
    let guard = db.rlock(&args[0]);
    Ok(Reply::optional(read_string(db, &guard, &args[0])?))
}

/// GETSET key value
///
/// The new value never inherits the old TTL.
pub fn getset(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "getset")?;
    let key = &args[0];
    let guard = db.lock(key);
    let old = read_string(db, &guard, key)?;
    store_string(db, &guard, key, &args[1]);
    db.cancel_ttl(&guard, key);
    Ok(Reply::optional(old))
}

fn pairs<'a>(args: &'a [Bytes], name: &'static str) -> CommandResult<Vec<&'a Bytes>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CommandError::WrongArity(name));
    }
    Ok(args.iter().step_by(2).collect())
}

/// MSET key value [key value ...]
pub fn mset(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    let keys = pairs(args, "mset")?;
    let guard = db.lock_all(&keys);
    for pair in args.chunks_exact(2) {
        store_string(db, &guard, &pair[0], &pair[1]);
        db.cancel_ttl(&guard, &pair[0]);
    }
    Ok(Reply::ok())
}

/// MSETNX key value [key value ...]
///
/// Sets nothing if any key exists.
pub fn msetnx(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    let keys = pairs(args, "msetnx")?;
    let guard = db.lock_all(&keys);
    if keys.iter().any(|key| db.exists_with_lock(&guard, key)) {
        return Ok(Reply::integer(0));
    }
    for pair in args.chunks_exact(2) {
        store_string(db, &guard, &pair[0], &pair[1]);
    }
    Ok(Reply::integer(1))
}

/// MGET key [key ...]
///
/// Keys that are absent or not strings read as null.
pub fn mget(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 1, "mget")?;
    let guard = db.rlock_all(args);
    let values = args
        .iter()
        .map(|key| Reply::optional(read_string(db, &guard, key).ok().flatten()))
        .collect();
    Ok(Reply::Array(values))
}

// ============================================================================
// Counters
// ============================================================================

fn incr_by(db: &Db, key: &Bytes, delta: i64) -> CommandResult<Reply> {
    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let current = match slot {
            None => 0,
            Some(value) => parse_int(value.as_string()?)?,
        };
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        *slot = Some(Value::String(next.to_string().into_bytes()));
        Ok(Reply::integer(next))
    })
}

/// INCR key
pub fn incr(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "incr")?;
    incr_by(db, &args[0], 1)
}

/// DECR key
pub fn decr(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "decr")?;
    incr_by(db, &args[0], -1)
}

/// INCRBY key increment
pub fn incrby(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "incrby")?;
    incr_by(db, &args[0], parse_int(&args[1])?)
}

/// DECRBY key decrement
pub fn decrby(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "decrby")?;
    let delta = parse_int(&args[1])?
        .checked_neg()
        .ok_or(CommandError::Overflow)?;
    incr_by(db, &args[0], delta)
}

/// INCRBYFLOAT key increment
pub fn incrbyfloat(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "incrbyfloat")?;
    let key = &args[0];
    let delta = parse_float(&args[1])?;

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let current = match slot {
            None => 0.0,
            Some(value) => parse_float(value.as_string()?)?,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(CommandError::NanOrInfinity);
        }
        let text = format_float(next);
        *slot = Some(Value::String(text.clone().into_bytes()));
        Ok(Reply::bulk(text))
    })
}

// ============================================================================
// Length and ranges
// ============================================================================

/// STRLEN key
pub fn strlen(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "strlen")?;
    let key = &args[0];
    let guard = db.rlock(key);
    let len = db.get_with_lock(&guard, key, |value| match value {
        None => Ok(0),
        Some(v) => v.as_string().map(<[u8]>::len),
    })?;
    Ok(Reply::count(len))
}

/// APPEND key value
pub fn append(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "append")?;
    let (key, suffix) = (&args[0], &args[1]);

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let s = string_slot(slot)?;
        check_len(s.len() + suffix.len())?;
        s.extend_from_slice(suffix);
        Ok(Reply::count(s.len()))
    })
}

/// SETRANGE key offset value
///
/// Pads with zero bytes when `offset` is past the end.
pub fn setrange(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "setrange")?;
    let (key, patch) = (&args[0], &args[2]);

    let offset = parse_int(&args[1])?;
    let offset = usize::try_from(offset).map_err(|_| CommandError::OffsetOutOfRange)?;
    check_len(offset.saturating_add(patch.len()))?;

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        if slot.is_none() && patch.is_empty() {
            return Ok(Reply::integer(0));
        }

        let s = string_slot(slot)?;
        if !patch.is_empty() {
            let end = offset + patch.len();
            if s.len() < end {
                s.resize(end, 0);
            }
            s[offset..end].copy_from_slice(patch);
        }
        Ok(Reply::count(s.len()))
    })
}

/// Inclusive byte range with negative indexing, clamped to `s`.
fn substring(s: &[u8], start: i64, end: i64) -> &[u8] {
    let len = s.len() as i64;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let end = if end < 0 { (end + len).max(0) } else { end.min(len - 1) };

    if len == 0 || start > end || start >= len {
        &[]
    } else {
        &s[start as usize..=end as usize]
    }
}

/// GETRANGE key start end
pub fn getrange(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "getrange")?;
    let key = &args[0];
    let start = parse_int(&args[1])?;
    let end = parse_int(&args[2])?;

    let guard = db.rlock(key);
    let value = read_string(db, &guard, key)?.unwrap_or_default();
    Ok(Reply::bulk(value.slice_ref(substring(&value, start, end))))
}

// ============================================================================
// Bitmaps
// ============================================================================

fn parse_bit_offset(raw: &[u8]) -> CommandResult<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&offset| offset <= bitmap::MAX_BIT_OFFSET)
        .ok_or(CommandError::BitOffset)
}

/// SETBIT key offset 0|1
pub fn setbit(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "setbit")?;
    let key = &args[0];
    let offset = parse_bit_offset(&args[1])?;
    let on = match args[2].as_ref() {
        b"0" => false,
        b"1" => true,
        _ => return Err(CommandError::BitValue),
    };

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let s = string_slot(slot)?;
        let old = bitmap::set_bit(s, offset, on);
        Ok(Reply::integer(old.into()))
    })
}

/// GETBIT key offset
pub fn getbit(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "getbit")?;
    let key = &args[0];
    let offset = parse_bit_offset(&args[1])?;

    let guard = db.rlock(key);
    let bit = db.get_with_lock(&guard, key, |value| match value {
        None => Ok(0),
        Some(v) => v.as_string().map(|s| bitmap::get_bit(s, offset)),
    })?;
    Ok(Reply::integer(bit.into()))
}

/// BITCOUNT key [start end]
///
/// `start` and `end` are byte offsets.
pub fn bitcount(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    let (start, end) = match args.len() {
        1 => (0, -1),
        3 => (parse_int(&args[1])?, parse_int(&args[2])?),
        2 => return Err(CommandError::Syntax),
        _ => return Err(CommandError::WrongArity("bitcount")),
    };
    let key = &args[0];

    let guard = db.rlock(key);
    let count = db.get_with_lock(&guard, key, |value| match value {
        None => Ok(0),
        Some(v) => v.as_string().map(|s| bitmap::count_ones(s, start, end)),
    })?;
    Ok(Reply::integer(count as i64))
}

/// BITOP AND|OR|XOR|NOT destkey key [key ...]
///
/// Returns the length of the stored result. An empty result deletes
/// `destkey`.
pub fn bitop(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 3, "bitop")?;
    let op = BitOp::parse(&args[0]).ok_or(CommandError::Syntax)?;
    let dest = &args[1];
    let sources = &args[2..];
    if op == BitOp::Not && sources.len() != 1 {
        return Err(CommandError::Syntax);
    }

    let guard = db.rw_lock(sources, std::slice::from_ref(dest));

    let operands = sources
        .iter()
        .map(|key| read_string(db, &guard, key))
        .collect::<CommandResult<Vec<_>>>()?;
    let refs: Vec<Option<&[u8]>> = operands.iter().map(|o| o.as_deref()).collect();
    let result = bitmap::bit_op(op, &refs);
    let len = result.len();

    if result.is_empty() {
        db.del_with_lock(&guard, dest);
    } else {
        db.cancel_ttl(&guard, dest);
        db.set_with_lock(&guard, dest.clone(), Value::String(result));
    }
    Ok(Reply::count(len))
}
