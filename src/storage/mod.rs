//! Storage Layer
//!
//! Everything below the command handlers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Db (engine)                        │
//! │   ┌──────────────┐   ┌────────────────────┐                 │
//! │   │   KeyLocks   │   │ ShardedMap<Value>  │  keyspace       │
//! │   │ (locks.rs)   │   │ ShardedMap<Instant>│  TTL index      │
//! │   └──────────────┘   └────────────────────┘                 │
//! └────────────────────────────┬────────────────────────────────┘
//!                              │
//!                 ┌────────────┴────────────┐
//!                 │        TimeWheel        │
//!                 │  (background Tokio task)│
//!                 └─────────────────────────┘
//! ```
//!
//! - `sharded`: fixed-size array of independently locked hash maps
//! - `locks`: key lock table giving commands multi-key atomicity
//! - `timewheel`: hashed timing wheel for per-key expiry callbacks
//! - `value`: the [`Value`] variant stored under each key
//! - `engine`: the [`Db`] tying them together
//!
//! ## Example
//!
//! ```
//! use wheelkv::storage::{Db, DbConfig};
//! use wheelkv::protocol::Reply;
//! use bytes::Bytes;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let db = Db::new(DbConfig::default());
//! db.dispatch(b"SET", &[Bytes::from("name"), Bytes::from("Ariz")]);
//! assert_eq!(db.dispatch(b"GET", &[Bytes::from("name")]), Reply::bulk("Ariz"));
//! # }
//! ```

pub mod engine;
pub mod locks;
pub mod sharded;
pub mod timewheel;
pub mod value;

pub use engine::{Db, DbConfig, TtlStatus};
pub use locks::{KeyGuard, KeyLocks};
pub use sharded::ShardedMap;
pub use timewheel::{TimeWheel, WheelConfig};
pub use value::{Value, ValueKind};
