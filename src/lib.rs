//! # wheelkv
//!
//! A Redis-compatible in-memory key-value store. Strings, lists, sets and
//! hashes live in a sharded keyspace. Commands take per-key locks, and key
//! expiry is driven by a timing wheel.
//!
//! ## Architecture
//!
//! ```text
//!  TcpListener (main.rs)
//!       │ accept, one task per client
//!       ▼
//!  ConnectionHandler ── parse_command ──> Db::execute ──> CommandTable
//!                                            │
//!             ┌──────────────────────────────┼────────────────────┐
//!             ▼                              ▼                    ▼
//!        KeyLocks                   ShardedMap<Value>     ShardedMap<Instant>
//!   (RwLock per slot,             (keyspace, latched        (deadlines)
//!    sorted multi-key)                per shard)                 ▲
//!                                                                 │
//!                                  TimeWheel task ─── expire_if_due
//! ```
//!
//! A command first takes the key locks covering every key it touches, then
//! reads and writes through the `*_with_lock` accessors on [`Db`]. Locks on
//! several keys are always taken in ascending slot order, so commands over
//! overlapping keys cannot deadlock.
//!
//! ## Expiry
//!
//! Keys with a TTL are removed two ways:
//! 1. **Active**: the timing wheel fires a task near the deadline, which takes
//!    the key's write lock and deletes the key if the deadline has passed.
//! 2. **Passive**: every locked access checks the deadline first, so an
//!    expired key is never observed between the deadline and the wheel tick.
//!
//! ## Modules
//!
//! - [`protocol`]: request decoding and reply encoding
//! - [`storage`]: sharded map, key locks, timing wheel and the [`Db`] engine
//! - [`types`]: list, set, hash and bitmap containers
//! - [`commands`]: command handlers and the dispatch table
//! - [`connection`]: per-client task
//! - [`config`]: defaults, config file and command-line flags

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod types;

pub use commands::CommandTable;
pub use config::{Config, ConfigError, Startup};
pub use connection::{handle_connection, ConnectionStats};
pub use error::{CommandError, CommandResult};
pub use protocol::{parse_command, ParseError, Reply};
pub use storage::{Db, DbConfig, WheelConfig};

/// Default listening port (same as Redis).
pub const DEFAULT_PORT: u16 = 6379;

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
