//! Hash commands.

use super::{arity, format_float, min_arity, parse_float, parse_int, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::{Db, Value};
use crate::types::Dict;
use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("hset", hset);
    table.register("hmset", hmset);
    table.register("hsetnx", hsetnx);
    table.register("hget", hget);
    table.register("hmget", hmget);
    table.register("hdel", hdel);
    table.register("hexists", hexists);
    table.register("hlen", hlen);
    table.register("hkeys", hkeys);
    table.register("hvals", hvals);
    table.register("hgetall", hgetall);
    table.register("hincrby", hincrby);
    table.register("hincrbyfloat", hincrbyfloat);
}

/// The hash in `slot`, created empty if the key is absent.
fn hash_slot(slot: &mut Option<Value>) -> CommandResult<&mut Dict> {
    slot.get_or_insert_with(|| Value::Hash(Dict::new()))
        .as_hash_mut()
}

/// Reads from the hash under `key`; absent keys read as `default`.
fn read_hash<R>(
    db: &Db,
    key: &[u8],
    default: R,
    f: impl FnOnce(&Dict) -> R,
) -> CommandResult<R> {
    let guard = db.rlock(key);
    db.get_with_lock(&guard, key, |value| match value {
        None => Ok(default),
        Some(v) => v.as_hash().map(f),
    })
}

/// Stores field/value pairs, returning how many fields were new.
fn set_pairs(db: &Db, args: &[Bytes], name: &'static str) -> CommandResult<usize> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(CommandError::WrongArity(name));
    }
    let key = &args[0];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let dict = hash_slot(slot)?;
        Ok(args[1..]
            .chunks_exact(2)
            .filter(|pair| dict.set(pair[0].clone(), pair[1].clone()))
            .count())
    })
}

/// HSET key field value [field value ...]
pub fn hset(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    set_pairs(db, args, "hset").map(Reply::count)
}

/// HMSET key field value [field value ...]
pub fn hmset(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    set_pairs(db, args, "hmset").map(|_| Reply::ok())
}

/// HSETNX key field value
pub fn hsetnx(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "hsetnx")?;
    let key = &args[0];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let dict = hash_slot(slot)?;
        if dict.exists(&args[1]) {
            return Ok(Reply::integer(0));
        }
        dict.set(args[1].clone(), args[2].clone());
        Ok(Reply::integer(1))
    })
}

/// HGET key field
pub fn hget(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "hget")?;
    let field = &args[1];
    read_hash(db, &args[0], None, |dict| dict.get(field).cloned()).map(Reply::optional)
}

/// HMGET key field [field ...]
pub fn hmget(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "hmget")?;
    let fields = &args[1..];
    let values = read_hash(db, &args[0], vec![None; fields.len()], |dict| {
        fields.iter().map(|f| dict.get(f).cloned()).collect()
    })?;
    Ok(Reply::Array(values.into_iter().map(Reply::optional).collect()))
}

/// HDEL key field [field ...]
pub fn hdel(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "hdel")?;
    let key = &args[0];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| match slot {
        None => Ok(Reply::integer(0)),
        Some(v) => {
            let dict = v.as_hash_mut()?;
            let removed = args[1..].iter().filter(|f| dict.remove(f)).count();
            Ok(Reply::count(removed))
        }
    })
}

/// HEXISTS key field
pub fn hexists(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "hexists")?;
    let found = read_hash(db, &args[0], false, |dict| dict.exists(&args[1]))?;
    Ok(Reply::integer(found.into()))
}

/// HLEN key
pub fn hlen(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "hlen")?;
    read_hash(db, &args[0], 0, Dict::len).map(Reply::count)
}

/// HKEYS key
pub fn hkeys(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "hkeys")?;
    read_hash(db, &args[0], Vec::new(), Dict::keys).map(Reply::bulks)
}

/// HVALS key
pub fn hvals(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "hvals")?;
    read_hash(db, &args[0], Vec::new(), Dict::values).map(Reply::bulks)
}

/// HGETALL key
///
/// Fields and values interleaved.
pub fn hgetall(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "hgetall")?;
    let entries = read_hash(db, &args[0], Vec::new(), Dict::entries)?;
    Ok(Reply::bulks(
        entries.into_iter().flat_map(|(field, value)| [field, value]),
    ))
}

/// HINCRBY key field increment
pub fn hincrby(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "hincrby")?;
    let (key, field) = (&args[0], &args[1]);
    let delta = parse_int(&args[2])?;

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let dict = hash_slot(slot)?;
        let current = match dict.get(field) {
            None => 0,
            Some(raw) => parse_int(raw).map_err(|_| CommandError::HashNotInteger)?,
        };
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        dict.set(field.clone(), Bytes::from(next.to_string()));
        Ok(Reply::integer(next))
    })
}

/// HINCRBYFLOAT key field increment
pub fn hincrbyfloat(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "hincrbyfloat")?;
    let (key, field) = (&args[0], &args[1]);
    let delta = parse_float(&args[2])?;

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let dict = hash_slot(slot)?;
        let current = match dict.get(field) {
            None => 0.0,
            Some(raw) => parse_float(raw).map_err(|_| CommandError::HashNotFloat)?,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(CommandError::NanOrInfinity);
        }
        let text = Bytes::from(format_float(next));
        dict.set(field.clone(), text.clone());
        Ok(Reply::bulk(text))
    })
}
