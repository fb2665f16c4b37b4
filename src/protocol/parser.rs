//! Request Decoder
//!
//! Turns bytes read from a client into command frames (`Vec<Bytes>`, the
//! command name first). Two request forms are accepted:
//!
//! - RESP arrays of bulk strings: `*2\r\n$3\r\nGET\r\n$1\r\nk\r\n`
//! - inline commands, as typed into telnet: `GET k\r\n`
//!
//! The decoder is incremental. It returns:
//! - `Ok(Some((frame, consumed)))` when a whole request is buffered
//! - `Ok(None)` when more bytes are needed
//! - `Err(ParseError)` when the input can never become a valid request

use bytes::Bytes;
use thiserror::Error;

/// Largest bulk argument accepted (512 MB).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest number of arguments in one request.
pub const MAX_ARGS: usize = 1024 * 1024;

/// Longest inline command or header line.
pub const MAX_INLINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected '{expected}', got {got:#04x}")]
    UnexpectedByte { expected: char, got: u8 },

    #[error("invalid length: {0}")]
    InvalidLength(String),

    #[error("bulk argument of {0} bytes exceeds limit")]
    BulkTooLarge(usize),

    #[error("too many arguments: {0}")]
    TooManyArgs(usize),

    #[error("line too long")]
    LineTooLong,

    #[error("bulk argument not terminated by CRLF")]
    MissingCrlf,
}

/// Decoded request: the frame and the number of bytes it occupied.
pub type Decoded = Option<(Vec<Bytes>, usize)>;

/// Decodes one request from the front of `buf`.
///
/// An empty inline line decodes to an empty frame, which callers skip.
pub fn parse_command(buf: &[u8]) -> Result<Decoded, ParseError> {
    match buf.first() {
        None => Ok(None),
        Some(b'*') => parse_array(buf),
        Some(_) => parse_inline(buf),
    }
}

/// Reads a `\r\n`-terminated header line starting at `at`.
///
/// Returns the line body and the offset just past the terminator.
fn read_line(buf: &[u8], at: usize) -> Result<Option<(&[u8], usize)>, ParseError> {
    let rest = &buf[at..];
    match rest.windows(2).position(|w| w == b"\r\n") {
        Some(end) => Ok(Some((&rest[..end], at + end + 2))),
        None if rest.len() > MAX_INLINE_LEN => Err(ParseError::LineTooLong),
        None => Ok(None),
    }
}

fn parse_length(digits: &[u8]) -> Result<i64, ParseError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned()))
}

fn parse_array(buf: &[u8]) -> Result<Decoded, ParseError> {
    let Some((header, mut pos)) = read_line(buf, 1)? else {
        return Ok(None);
    };

    let count = parse_length(header)?;
    if count <= 0 {
        return Ok(Some((Vec::new(), pos)));
    }
    let count = count as usize;
    if count > MAX_ARGS {
        return Err(ParseError::TooManyArgs(count));
    }

    let mut frame = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let Some(&prefix) = buf.get(pos) else {
            return Ok(None);
        };
        if prefix != b'$' {
            return Err(ParseError::UnexpectedByte {
                expected: '$',
                got: prefix,
            });
        }

        let Some((header, start)) = read_line(buf, pos + 1)? else {
            return Ok(None);
        };
        let len = parse_length(header)?;
        if len < 0 {
            return Err(ParseError::InvalidLength(len.to_string()));
        }
        let len = len as usize;
        if len > MAX_BULK_LEN {
            return Err(ParseError::BulkTooLarge(len));
        }

        let end = start + len;
        if buf.len() < end + 2 {
            return Ok(None);
        }
        if &buf[end..end + 2] != b"\r\n" {
            return Err(ParseError::MissingCrlf);
        }

        frame.push(Bytes::copy_from_slice(&buf[start..end]));
        pos = end + 2;
    }

    Ok(Some((frame, pos)))
}

fn parse_inline(buf: &[u8]) -> Result<Decoded, ParseError> {
    let Some((line, consumed)) = read_line(buf, 0)? else {
        return Ok(None);
    };

    let frame = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|word| !word.is_empty())
        .map(Bytes::copy_from_slice)
        .collect();

    Ok(Some((frame, consumed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    #[test]
    fn test_parse_resp_array() {
        let input = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n";
        let (parsed, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(parsed, frame(&["SET", "user:101", "Ariz"]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_inline() {
        let (parsed, consumed) = parse_command(b"PING  hello\r\nGET").unwrap().unwrap();
        assert_eq!(parsed, frame(&["PING", "hello"]));
        assert_eq!(consumed, 13);
    }

    #[test]
    fn test_blank_inline_line_is_empty_frame() {
        let (parsed, consumed) = parse_command(b"\r\n").unwrap().unwrap();
        assert!(parsed.is_empty());
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_incomplete_input_needs_more() {
        let full = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        for cut in 0..full.len() {
            assert_eq!(parse_command(&full[..cut]).unwrap(), None, "cut at {}", cut);
        }
        assert!(parse_command(b"GET na").unwrap().is_none());
    }

    #[test]
    fn test_pipelined_requests() {
        let input = b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n";
        let (first, used) = parse_command(input).unwrap().unwrap();
        assert_eq!(first, frame(&["PING"]));
        let (second, rest) = parse_command(&input[used..]).unwrap().unwrap();
        assert_eq!(second, frame(&["ECHO", "hi"]));
        assert_eq!(used + rest, input.len());
    }

    #[test]
    fn test_binary_safe_argument() {
        let input = b"*1\r\n$5\r\nhel\x00o\r\n";
        let (parsed, _) = parse_command(input).unwrap().unwrap();
        assert_eq!(parsed[0].as_ref(), b"hel\x00o");
    }

    #[test]
    fn test_malformed_requests() {
        assert!(matches!(
            parse_command(b"*1\r\n:5\r\n"),
            Err(ParseError::UnexpectedByte { expected: '$', .. })
        ));
        assert!(matches!(
            parse_command(b"*x\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
        assert_eq!(
            parse_command(b"*1\r\n$2\r\nabc\r\n"),
            Err(ParseError::MissingCrlf)
        );
        assert!(matches!(
            parse_command(b"*1\r\n$-5\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
    }
}
