//! Typed Replies
//!
//! Every command produces exactly one [`Reply`]. The connection layer turns
//! it into RESP bytes:
//!
//! ```text
//!   Simple("OK")        +OK\r\n
//!   Error("ERR ...")    -ERR ...\r\n
//!   Integer(42)         :42\r\n
//!   Bulk("hi")          $2\r\nhi\r\n
//!   Null                $-1\r\n
//!   Array([..])         *<n>\r\n<item>...
//! ```

use crate::error::CommandError;
use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// The null bulk string.
    Null,
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Simple("PONG".to_string())
    }

    pub fn simple(s: impl Into<String>) -> Self {
        Reply::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Integer reply from an unsigned count.
    pub fn count(n: usize) -> Self {
        Reply::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Bulk string when present, null otherwise.
    pub fn optional(data: Option<Bytes>) -> Self {
        data.map_or(Reply::Null, Reply::Bulk)
    }

    /// Array of bulk strings.
    pub fn bulks<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        Reply::Array(items.into_iter().map(Reply::Bulk).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Encodes the reply as RESP.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Appends the RESP encoding to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Reply::Simple(s) => text_line(buf, b'+', s),
            Reply::Error(s) => text_line(buf, b'-', s),
            Reply::Integer(n) => line(buf, b':', n.to_string().as_bytes()),
            Reply::Bulk(data) => {
                line(buf, b'$', data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Reply::Null => buf.put_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }
}

fn line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
    buf.put_u8(prefix);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

/// Simple and error lines cannot carry a line break, so CR and LF in the
/// text are written as spaces.
fn text_line(buf: &mut BytesMut, prefix: u8, text: &str) {
    buf.put_u8(prefix);
    buf.extend(text.bytes().map(|b| match b {
        b'\r' | b'\n' => b' ',
        other => other,
    }));
    buf.put_slice(CRLF);
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::Error(err.to_string())
    }
}
