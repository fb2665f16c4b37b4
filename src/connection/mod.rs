//! Client Connections
//!
//! Every accepted socket gets its own Tokio task running a
//! [`ConnectionHandler`]. Handlers share the [`Db`](crate::storage::Db)
//! through an `Arc` and never talk to each other directly.
//!
//! The handler is generic over `AsyncRead + AsyncWrite`, so the same loop
//! serves a `TcpStream` in production and a mock stream in tests.
//!
//! ```ignore
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, Arc::clone(&db), Arc::clone(&stats)));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
