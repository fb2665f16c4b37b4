//! Command Handlers
//!
//! One file per command group. Every handler has the same shape:
//!
//! ```text
//! fn(&Db, &[Bytes]) -> Result<Reply, CommandError>
//!         └─ arguments after the command name
//! ```
//!
//! A handler validates its arguments, acquires the key locks for every key it
//! touches (including destination keys) through the [`Db`], and then works on
//! values with the `*_with_lock` accessors. Returning `Err` produces an error
//! reply and leaves the keyspace untouched.
//!
//! ## Command Groups
//!
//! - `connection`: `PING`, `ECHO`
//! - `keys`: `DEL`, `EXISTS`, `TTL`, `PTTL`, `EXPIRE`, `PEXPIRE`, `EXPIREAT`,
//!   `PERSIST`, `RENAME`, `RENAMENX`, `TYPE`, `DBSIZE`
//! - `strings`: `SET`, `GET`, `INCR` family, ranges and bitmaps
//! - `lists`: `LPUSH` ... `LTRIM`
//! - `hashes`: `HSET` ... `HINCRBYFLOAT`
//! - `sets`: `SADD` ... `SUNIONSTORE`
//!
//! The [`CommandTable`] mapping names to handlers is built once when the
//! database is created and never changes afterwards.

pub mod connection;
pub mod hashes;
pub mod keys;
pub mod lists;
pub mod sets;
pub mod strings;

use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::Db;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Signature shared by every command handler.
pub type CommandFn = fn(&Db, &[Bytes]) -> CommandResult<Reply>;

/// Immutable registry of command handlers, keyed by lowercase name.
pub struct CommandTable {
    handlers: HashMap<&'static str, CommandFn>,
}

impl CommandTable {
    /// Builds the table with every supported command.
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };

        connection::register(&mut table);
        keys::register(&mut table);
        strings::register(&mut table);
        lists::register(&mut table);
        hashes::register(&mut table);
        sets::register(&mut table);

        table
    }

    fn register(&mut self, name: &'static str, handler: CommandFn) {
        let previous = self.handlers.insert(name, handler);
        debug_assert!(previous.is_none(), "command '{}' registered twice", name);
    }

    /// Handler for a lowercase command name.
    pub fn get(&self, name: &str) -> Option<CommandFn> {
        self.handlers.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Requires exactly `n` arguments.
pub(crate) fn arity(args: &[Bytes], n: usize, name: &'static str) -> CommandResult<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name))
    }
}

/// Requires at least `n` arguments.
pub(crate) fn min_arity(args: &[Bytes], n: usize, name: &'static str) -> CommandResult<()> {
    if args.len() >= n {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name))
    }
}

/// Parses a signed 64-bit integer argument or stored value.
pub(crate) fn parse_int(raw: &[u8]) -> CommandResult<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotInteger)
}

/// Parses a float argument or stored value. NaN is rejected.
pub(crate) fn parse_float(raw: &[u8]) -> CommandResult<f64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(CommandError::NotFloat)
}

/// Renders a float the way it is stored: shortest form, no exponent.
pub(crate) fn format_float(value: f64) -> String {
    format!("{}", value)
}

/// Converts a relative expire amount into a duration.
///
/// Non-positive amounts and deadlines too far away to represent are
/// rejected with the command's "invalid expire time" error.
pub(crate) fn expire_duration(
    amount: i64,
    in_seconds: bool,
    name: &'static str,
) -> CommandResult<Duration> {
    let millis = if in_seconds {
        amount.checked_mul(1000)
    } else {
        Some(amount)
    };

    match millis {
        Some(ms) if ms > 0 => {
            let ttl = Duration::from_millis(ms as u64);
            Instant::now()
                .checked_add(ttl)
                .map(|_| ttl)
                .ok_or(CommandError::InvalidExpire(name))
        }
        _ => Err(CommandError::InvalidExpire(name)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::protocol::Reply;
    use crate::storage::{Db, DbConfig, WheelConfig};
    use bytes::Bytes;
    use std::time::Duration;

    /// A database with a 10ms timing wheel. Needs a Tokio runtime.
    pub fn test_db() -> Db {
        Db::new(DbConfig {
            wheel: WheelConfig {
                tick: Duration::from_millis(10),
                slots: 64,
            },
            ..DbConfig::default()
        })
    }

    /// Runs a whitespace-free command line, e.g. `run(&db, &["SET", "k", "v"])`.
    pub fn run(db: &Db, parts: &[&str]) -> Reply {
        let frame: Vec<Bytes> = parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect();
        db.execute(&frame)
    }

    pub fn bulk(s: &str) -> Reply {
        Reply::bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn bulks(items: &[&str]) -> Reply {
        Reply::Array(items.iter().map(|s| bulk(s)).collect())
    }

    /// Members of an array reply, sorted, for order-free comparisons.
    pub fn sorted(reply: Reply) -> Vec<Reply> {
        match reply {
            Reply::Array(mut items) => {
                items.sort_by_key(|item| match item {
                    Reply::Bulk(b) => b.clone(),
                    _ => Bytes::new(),
                });
                items
            }
            other => panic!("expected array reply, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_contains_every_group() {
        let table = CommandTable::new();
        for name in ["ping", "del", "set", "bitop", "lpush", "hset", "sunionstore"] {
            assert!(table.get(name).is_some(), "missing {}", name);
        }
        assert!(table.get("SET").is_none());
        assert!(table.get("flushall").is_none());
        assert_eq!(table.len(), table.names().len());
        assert!(table.len() >= 77);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_int(b"-42"), Ok(-42));
        assert_eq!(parse_int(b"4.2"), Err(CommandError::NotInteger));
        assert_eq!(parse_int(b"99999999999999999999"), Err(CommandError::NotInteger));
        assert_eq!(parse_float(b"1.5"), Ok(1.5));
        assert_eq!(parse_float(b"nan"), Err(CommandError::NotFloat));
        assert_eq!(format_float(10.0), "10");
        assert_eq!(format_float(10.5), "10.5");
    }

    #[test]
    fn test_expire_duration() {
        assert_eq!(
            expire_duration(2, true, "expire"),
            Ok(Duration::from_secs(2))
        );
        assert_eq!(
            expire_duration(0, true, "set"),
            Err(CommandError::InvalidExpire("set"))
        );
        assert_eq!(
            expire_duration(i64::MAX, true, "set"),
            Err(CommandError::InvalidExpire("set"))
        );
    }
}
