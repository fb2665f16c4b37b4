//! List commands.

use super::{arity, min_arity, parse_int, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::{Db, Value};
use crate::types::QuickList;
use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("lpush", lpush);
    table.register("rpush", rpush);
    table.register("lpushx", lpushx);
    table.register("rpushx", rpushx);
    table.register("lpop", lpop);
    table.register("rpop", rpop);
    table.register("lindex", lindex);
    table.register("llen", llen);
    table.register("lrange", lrange);
    table.register("lset", lset);
    table.register("lrem", lrem);
    table.register("ltrim", ltrim);
    table.register("linsert", linsert);
    table.register("rpoplpush", rpoplpush);
}

/// The list in `slot`, created empty if the key is absent.
fn list_slot(slot: &mut Option<Value>) -> CommandResult<&mut QuickList> {
    slot.get_or_insert_with(|| Value::List(QuickList::new()))
        .as_list_mut()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

fn push(list: &mut QuickList, end: End, values: &[Bytes]) {
    for value in values {
        match end {
            End::Head => list.push_front(value.clone()),
            End::Tail => list.push_back(value.clone()),
        }
    }
}

fn push_command(db: &Db, args: &[Bytes], end: End, only_existing: bool) -> CommandResult<Reply> {
    let (key, values) = (&args[0], &args[1..]);
    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        if only_existing && slot.is_none() {
            return Ok(Reply::integer(0));
        }
        let list = list_slot(slot)?;
        push(list, end, values);
        Ok(Reply::count(list.len()))
    })
}

/// LPUSH key value [value ...]
pub fn lpush(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "lpush")?;
    push_command(db, args, End::Head, false)
}

/// RPUSH key value [value ...]
pub fn rpush(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "rpush")?;
    push_command(db, args, End::Tail, false)
}

/// LPUSHX key value [value ...]
pub fn lpushx(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "lpushx")?;
    push_command(db, args, End::Head, true)
}

/// RPUSHX key value [value ...]
pub fn rpushx(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "rpushx")?;
    push_command(db, args, End::Tail, true)
}

fn pop_command(db: &Db, key: &Bytes, end: End) -> CommandResult<Reply> {
    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let Some(value) = slot else {
            return Ok(Reply::Null);
        };
        let list = value.as_list_mut()?;
        let popped = match end {
            End::Head => list.pop_front(),
            End::Tail => list.pop_back(),
        };
        Ok(Reply::optional(popped))
    })
}

/// LPOP key
pub fn lpop(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "lpop")?;
    pop_command(db, &args[0], End::Head)
}

/// RPOP key
pub fn rpop(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "rpop")?;
    pop_command(db, &args[0], End::Tail)
}

/// LINDEX key index
pub fn lindex(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "lindex")?;
    let key = &args[0];
    let index = parse_int(&args[1])?;

    let guard = db.rlock(key);
    let item = db.get_with_lock(&guard, key, |value| match value {
        None => Ok(None),
        Some(v) => v.as_list().map(|list| list.index(index).cloned()),
    })?;
    Ok(Reply::optional(item))
}

/// LLEN key
pub fn llen(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "llen")?;
    let key = &args[0];
    let guard = db.rlock(key);
    let len = db.get_with_lock(&guard, key, |value| match value {
        None => Ok(0),
        Some(v) => v.as_list().map(QuickList::len),
    })?;
    Ok(Reply::count(len))
}

/// LRANGE key start stop
pub fn lrange(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "lrange")?;
    let key = &args[0];
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;

    let guard = db.rlock(key);
    let items = db.get_with_lock(&guard, key, |value| match value {
        None => Ok(Vec::new()),
        Some(v) => v.as_list().map(|list| list.range(start, stop)),
    })?;
    Ok(Reply::bulks(items))
}

/// LSET key index value
pub fn lset(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "lset")?;
    let key = &args[0];
    let index = parse_int(&args[1])?;
    let value = args[2].clone();

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let list = slot
            .as_mut()
            .ok_or(CommandError::NoSuchKey)?
            .as_list_mut()?;
        if list.set(index, value) {
            Ok(Reply::ok())
        } else {
            Err(CommandError::IndexOutOfRange)
        }
    })
}

/// LREM key count value
pub fn lrem(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "lrem")?;
    let key = &args[0];
    let count = parse_int(&args[1])?;
    let target = &args[2];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| match slot {
        None => Ok(Reply::integer(0)),
        Some(v) => {
            let removed = v.as_list_mut()?.remove_by_value(target, count);
            Ok(Reply::count(removed))
        }
    })
}

/// LTRIM key start stop
pub fn ltrim(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "ltrim")?;
    let key = &args[0];
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        if let Some(v) = slot {
            v.as_list_mut()?.trim(start, stop);
        }
        Ok(Reply::ok())
    })
}

/// LINSERT key BEFORE|AFTER pivot value
///
/// Returns the new length, `-1` if the pivot is missing, `0` if the key is.
pub fn linsert(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 4, "linsert")?;
    let key = &args[0];
    let after = match args[1].to_ascii_uppercase().as_slice() {
        b"BEFORE" => false,
        b"AFTER" => true,
        _ => return Err(CommandError::Syntax),
    };
    let (pivot, value) = (&args[2], args[3].clone());

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let Some(v) = slot else {
            return Ok(Reply::integer(0));
        };
        let list = v.as_list_mut()?;
        let Some(at) = list.position(pivot) else {
            return Ok(Reply::integer(-1));
        };
        list.insert(if after { at + 1 } else { at }, value);
        Ok(Reply::count(list.len()))
    })
}

/// RPOPLPUSH source destination
///
/// With `source == destination` the list rotates by one in place, so a
/// one-element list is never emptied and keeps its TTL.
pub fn rpoplpush(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "rpoplpush")?;
    let (src, dst) = (&args[0], &args[1]);

    let guard = db.lock_all(args);

    if src == dst {
        let rotated = db.update_with_lock(&guard, src, |slot| match slot {
            None => Ok(None),
            Some(v) => {
                let list = v.as_list_mut()?;
                let item = list.pop_back();
                if let Some(item) = &item {
                    list.push_front(item.clone());
                }
                Ok(item)
            }
        })?;
        return Ok(Reply::optional(rotated));
    }

    // Fail before popping if the destination cannot take the element.
    db.get_with_lock(&guard, dst, |value| match value {
        Some(v) => v.as_list().map(|_| ()),
        None => Ok(()),
    })?;

    let popped = db.update_with_lock(&guard, src, |slot| match slot {
        None => Ok(None),
        Some(v) => v.as_list_mut().map(QuickList::pop_back),
    })?;
    let Some(item) = popped else {
        return Ok(Reply::Null);
    };

    db.update_with_lock(&guard, dst, |slot| {
        list_slot(slot).map(|list| list.push_front(item.clone()))
    })?;
    Ok(Reply::bulk(item))
}
