//! Set commands, including the multi-key algebra.

use super::{arity, min_arity, parse_int, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::{Db, KeyGuard, Value};
use crate::types::set::{difference, intersect, union, MAX_RANDOM_SAMPLE};
use crate::types::Set;
use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("sadd", sadd);
    table.register("srem", srem);
    table.register("scard", scard);
    table.register("smembers", smembers);
    table.register("sismember", sismember);
    table.register("spop", spop);
    table.register("srandmember", srandmember);
    table.register("smove", smove);
    table.register("sinter", sinter);
    table.register("sinterstore", sinterstore);
    table.register("sunion", sunion);
    table.register("sunionstore", sunionstore);
    table.register("sdiff", sdiff);
    table.register("sdiffstore", sdiffstore);
}

fn set_slot(slot: &mut Option<Value>) -> CommandResult<&mut Set> {
    slot.get_or_insert_with(|| Value::Set(Set::new()))
        .as_set_mut()
}

fn read_set<R>(db: &Db, key: &[u8], default: R, f: impl FnOnce(&Set) -> R) -> CommandResult<R> {
    let guard = db.rlock(key);
    db.get_with_lock(&guard, key, |value| match value {
        None => Ok(default),
        Some(v) => v.as_set().map(f),
    })
}

/// Copies out the sets stored under `keys`, `None` for absent keys.
///
/// Fails with `WRONGTYPE` if any key holds something other than a set.
fn load_sets(db: &Db, guard: &KeyGuard<'_>, keys: &[Bytes]) -> CommandResult<Vec<Option<Set>>> {
    keys.iter()
        .map(|key| {
            db.get_with_lock(guard, key, |value| match value {
                None => Ok(None),
                Some(v) => v.as_set().map(|s| Some(s.clone())),
            })
        })
        .collect()
}

#[derive(Clone, Copy)]
enum Algebra {
    Inter,
    Union,
    Diff,
}

impl Algebra {
    fn apply(self, sets: &[Option<Set>]) -> Set {
        let refs: Vec<Option<&Set>> = sets.iter().map(Option::as_ref).collect();
        match self {
            // Any missing key makes the intersection empty.
            Self::Inter => match refs.iter().copied().collect::<Option<Vec<&Set>>>() {
                Some(all) => intersect(&all),
                None => Set::new(),
            },
            Self::Union => union(&refs),
            Self::Diff => match refs.split_first() {
                Some((Some(first), others)) => difference(first, others),
                _ => Set::new(),
            },
        }
    }
}

fn combine(db: &Db, keys: &[Bytes], op: Algebra) -> CommandResult<Reply> {
    let guard = db.rlock_all(keys);
    let sets = load_sets(db, &guard, keys)?;
    drop(guard);

    Ok(Reply::bulks(op.apply(&sets).members()))
}

/// Computes `op` over `sources` and stores it under `dest`, clearing any TTL
/// on `dest`. An empty result deletes `dest`.
fn combine_store(db: &Db, dest: &Bytes, sources: &[Bytes], op: Algebra) -> CommandResult<Reply> {
    let guard = db.rw_lock(sources, std::slice::from_ref(dest));
    let sets = load_sets(db, &guard, sources)?;
    let result = op.apply(&sets);
    let len = result.len();

    db.cancel_ttl(&guard, dest);
    db.set_with_lock(&guard, dest.clone(), Value::Set(result));
    Ok(Reply::count(len))
}

/// SADD key member [member ...]
pub fn sadd(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "sadd")?;
    let key = &args[0];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| {
        let set = set_slot(slot)?;
        let added = args[1..].iter().filter(|m| set.add((*m).clone())).count();
        Ok(Reply::count(added))
    })
}

/// SREM key member [member ...]
pub fn srem(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "srem")?;
    let key = &args[0];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| match slot {
        None => Ok(Reply::integer(0)),
        Some(v) => {
            let set = v.as_set_mut()?;
            let removed = args[1..].iter().filter(|m| set.remove(m)).count();
            Ok(Reply::count(removed))
        }
    })
}

/// SCARD key
pub fn scard(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "scard")?;
    read_set(db, &args[0], 0, Set::len).map(Reply::count)
}

/// SMEMBERS key
pub fn smembers(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "smembers")?;
    read_set(db, &args[0], Vec::new(), Set::members).map(Reply::bulks)
}

/// SISMEMBER key member
pub fn sismember(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 2, "sismember")?;
    let found = read_set(db, &args[0], false, |set| set.contains(&args[1]))?;
    Ok(Reply::integer(found.into()))
}

/// SPOP key
pub fn spop(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "spop")?;
    let key = &args[0];

    let guard = db.lock(key);
    db.update_with_lock(&guard, key, |slot| match slot {
        None => Ok(Reply::Null),
        Some(v) => Ok(Reply::optional(v.as_set_mut()?.pop())),
    })
}

/// SRANDMEMBER key [count]
///
/// Without a count, one member or null. With a count, an array: distinct
/// members for a positive count, `|count|` possibly repeated members for a
/// negative one. A negative count beyond [`MAX_RANDOM_SAMPLE`] is out of range.
pub fn srandmember(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    match args {
        [key] => {
            let mut picked = read_set(db, key, Vec::new(), |set| set.rand_members(1))?;
            Ok(Reply::optional(picked.pop()))
        }
        [key, count] => {
            let count = parse_int(count)?;
            if count < 0 && count.unsigned_abs() > MAX_RANDOM_SAMPLE as u64 {
                return Err(CommandError::NotInteger);
            }
            read_set(db, key, Vec::new(), |set| set.rand_members(count)).map(Reply::bulks)
        }
        _ => Err(CommandError::WrongArity("srandmember")),
    }
}

/// SMOVE source destination member
pub fn smove(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 3, "smove")?;
    let (src, dst, member) = (&args[0], &args[1], &args[2]);

    let guard = db.lock_all(&[src, dst]);

    if src == dst {
        let found = db.get_with_lock(&guard, src, |value| match value {
            None => Ok(false),
            Some(v) => v.as_set().map(|s| s.contains(member)),
        })?;
        return Ok(Reply::integer(found.into()));
    }

    // The destination must be a set (or absent) before anything moves.
    db.get_with_lock(&guard, dst, |value| match value {
        Some(v) => v.as_set().map(|_| ()),
        None => Ok(()),
    })?;

    let moved = db.update_with_lock(&guard, src, |slot| match slot {
        None => Ok(false),
        Some(v) => Ok(v.as_set_mut()?.remove(member)),
    })?;
    if !moved {
        return Ok(Reply::integer(0));
    }

    db.update_with_lock(&guard, dst, |slot| {
        set_slot(slot).map(|set| set.add(member.clone()))
    })?;
    Ok(Reply::integer(1))
}

/// SINTER key [key ...]
pub fn sinter(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 1, "sinter")?;
    combine(db, args, Algebra::Inter)
}

/// SINTERSTORE destination key [key ...]
pub fn sinterstore(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "sinterstore")?;
    combine_store(db, &args[0], &args[1..], Algebra::Inter)
}

/// SUNION key [key ...]
pub fn sunion(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 1, "sunion")?;
    combine(db, args, Algebra::Union)
}

/// SUNIONSTORE destination key [key ...]
pub fn sunionstore(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "sunionstore")?;
    combine_store(db, &args[0], &args[1..], Algebra::Union)
}

/// SDIFF key [key ...]
pub fn sdiff(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 1, "sdiff")?;
    combine(db, args, Algebra::Diff)
}

/// SDIFFSTORE destination key [key ...]
pub fn sdiffstore(db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    min_arity(args, 2, "sdiffstore")?;
    combine_store(db, &args[0], &args[1..], Algebra::Diff)
}

#[cfg(test)]
mod tests {
    use crate::commands::testing::{bulk, bulks, run, sorted, test_db};
    use crate::protocol::Reply;

    #[tokio::test]
    async fn test_sadd_srem_scard() {
        let db = test_db();
        assert_eq!(run(&db, &["SADD", "s", "a", "b", "a"]), Reply::integer(2));
        assert_eq!(run(&db, &["SADD", "s", "b", "c"]), Reply::integer(1));
        assert_eq!(run(&db, &["SCARD", "s"]), Reply::integer(3));
        assert_eq!(run(&db, &["SISMEMBER", "s", "c"]), Reply::integer(1));
        assert_eq!(run(&db, &["SISMEMBER", "s", "z"]), Reply::integer(0));

        assert_eq!(run(&db, &["SREM", "s", "a", "z"]), Reply::integer(1));
        assert_eq!(sorted(run(&db, &["SMEMBERS", "s"])), sorted(bulks(&["b", "c"])));

        assert_eq!(run(&db, &["SREM", "s", "b", "c"]), Reply::integer(2));
        assert_eq!(run(&db, &["EXISTS", "s"]), Reply::integer(0));
        assert_eq!(run(&db, &["SCARD", "s"]), Reply::integer(0));
    }

    #[tokio::test]
    async fn test_spop_drains_and_deletes() {
        let db = test_db();
        run(&db, &["SADD", "s", "a", "b"]);

        let mut popped = vec![run(&db, &["SPOP", "s"]), run(&db, &["SPOP", "s"])];
        popped.sort_by_key(|r| format!("{:?}", r));
        assert_eq!(popped, vec![bulk("a"), bulk("b")]);

        assert_eq!(run(&db, &["EXISTS", "s"]), Reply::integer(0));
        assert_eq!(run(&db, &["SPOP", "s"]), Reply::Null);
    }

    #[tokio::test]
    async fn test_srandmember_shapes() {
        let db = test_db();
        assert_eq!(run(&db, &["SRANDMEMBER", "s"]), Reply::Null);
        assert_eq!(run(&db, &["SRANDMEMBER", "s", "3"]), Reply::Array(vec![]));

        run(&db, &["SADD", "s", "a", "b", "c"]);
        assert!(matches!(run(&db, &["SRANDMEMBER", "s"]), Reply::Bulk(_)));

        match run(&db, &["SRANDMEMBER", "s", "10"]) {
            Reply::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        match run(&db, &["SRANDMEMBER", "s", "-7"]) {
            Reply::Array(items) => assert_eq!(items.len(), 7),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(run(&db, &["SCARD", "s"]), Reply::integer(3));
    }

    #[tokio::test]
    async fn test_srandmember_extreme_counts() {
        let db = test_db();
        run(&db, &["SADD", "s", "a", "b", "c"]);

        assert_eq!(
            sorted(run(&db, &["SRANDMEMBER", "s", "9223372036854775807"])),
            sorted(bulks(&["a", "b", "c"]))
        );
        assert_eq!(
            run(&db, &["SRANDMEMBER", "s", "-9223372036854775807"]),
            Reply::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&db, &["SRANDMEMBER", "s", "-9223372036854775808"]),
            Reply::error("ERR value is not an integer or out of range")
        );
        assert_eq!(run(&db, &["SCARD", "s"]), Reply::integer(3));
    }

    #[tokio::test]
    async fn test_algebra_reads() {
        let db = test_db();
        run(&db, &["SADD", "a", "1", "2", "3"]);
        run(&db, &["SADD", "b", "2", "3", "4"]);

        assert_eq!(sorted(run(&db, &["SINTER", "a", "b"])), sorted(bulks(&["2", "3"])));
        assert_eq!(
            sorted(run(&db, &["SUNION", "a", "b", "missing"])),
            sorted(bulks(&["1", "2", "3", "4"]))
        );
        assert_eq!(run(&db, &["SDIFF", "a", "b", "missing"]), bulks(&["1"]));

        assert_eq!(run(&db, &["SINTER", "a", "missing"]), Reply::Array(vec![]));
        assert_eq!(run(&db, &["SDIFF", "missing", "a"]), Reply::Array(vec![]));

        run(&db, &["SET", "str", "x"]);
        assert!(run(&db, &["SUNION", "a", "str"]).is_error());
    }

    #[tokio::test]
    async fn test_store_overwrites_and_clears_ttl() {
        let db = test_db();
        run(&db, &["SADD", "a", "1", "2"]);
        run(&db, &["SADD", "b", "2", "3"]);
        run(&db, &["SET", "dest", "old"]);
        run(&db, &["EXPIRE", "dest", "100"]);

        assert_eq!(run(&db, &["SUNIONSTORE", "dest", "a", "b"]), Reply::integer(3));
        assert_eq!(run(&db, &["TYPE", "dest"]), Reply::simple("set"));
        assert_eq!(run(&db, &["TTL", "dest"]), Reply::integer(-1));

        assert_eq!(run(&db, &["SINTERSTORE", "dest", "a", "b"]), Reply::integer(1));
        assert_eq!(run(&db, &["SMEMBERS", "dest"]), bulks(&["2"]));

        assert_eq!(run(&db, &["SDIFFSTORE", "a", "a", "b"]), Reply::integer(1));
        assert_eq!(run(&db, &["SMEMBERS", "a"]), bulks(&["1"]));

        assert_eq!(run(&db, &["SINTERSTORE", "dest", "a", "missing"]), Reply::integer(0));
        assert_eq!(run(&db, &["EXISTS", "dest"]), Reply::integer(0));
    }

    #[tokio::test]
    async fn test_smove() {
        let db = test_db();
        run(&db, &["SADD", "src", "a", "b"]);

        assert_eq!(run(&db, &["SMOVE", "src", "dst", "a"]), Reply::integer(1));
        assert_eq!(run(&db, &["SMOVE", "src", "dst", "zz"]), Reply::integer(0));
        assert_eq!(run(&db, &["SMEMBERS", "dst"]), bulks(&["a"]));
        assert_eq!(run(&db, &["SMOVE", "src", "src", "b"]), Reply::integer(1));

        run(&db, &["SET", "str", "x"]);
        assert!(run(&db, &["SMOVE", "src", "str", "b"]).is_error());
        assert_eq!(run(&db, &["SISMEMBER", "src", "b"]), Reply::integer(1));

        assert_eq!(run(&db, &["SMOVE", "src", "dst", "b"]), Reply::integer(1));
        assert_eq!(run(&db, &["EXISTS", "src"]), Reply::integer(0));
        assert_eq!(run(&db, &["SCARD", "dst"]), Reply::integer(2));
    }
}
