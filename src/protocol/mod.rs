//! RESP Protocol
//!
//! The wire edge of the server:
//!
//! - `parser`: incremental decoder for client requests (RESP arrays and
//!   inline commands)
//! - `reply`: the typed [`Reply`] every command returns, and its encoder
//!
//! ## Example
//!
//! ```
//! use wheelkv::protocol::{parse_command, Reply};
//!
//! let (frame, consumed) = parse_command(b"*1\r\n$4\r\nPING\r\n").unwrap().unwrap();
//! assert_eq!(frame[0].as_ref(), b"PING");
//! assert_eq!(consumed, 14);
//!
//! assert_eq!(Reply::pong().serialize(), b"+PONG\r\n");
//! ```

pub mod parser;
pub mod reply;

pub use parser::{parse_command, ParseError};
pub use reply::Reply;
