//! Command Errors
//!
//! Every user-visible command failure. The `Display` text is exactly what a
//! client receives after the leading `-` of the error reply, so the messages
//! follow the Redis wording clients already match on.

use thiserror::Error;

/// Result type returned by every command handler.
pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR syntax error")]
    Syntax,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR increment would produce NaN or Infinity")]
    NanOrInfinity,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR bit offset is not an integer or out of range")]
    BitOffset,

    #[error("ERR bit is not an integer or out of range")]
    BitValue,

    #[error("ERR offset is out of range")]
    OffsetOutOfRange,

    #[error("ERR string exceeds maximum allowed size (512MB)")]
    StringTooLong,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpire(&'static str),

    #[error("ERR hash value is not an integer")]
    HashNotInteger,

    #[error("ERR hash value is not a float")]
    HashNotFloat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_text() {
        assert_eq!(
            CommandError::WrongArity("get").to_string(),
            "ERR wrong number of arguments for 'get' command"
        );
        assert_eq!(
            CommandError::UnknownCommand("nope".into()).to_string(),
            "ERR unknown command 'nope'"
        );
        assert!(CommandError::WrongType.to_string().starts_with("WRONGTYPE "));
        assert_eq!(
            CommandError::InvalidExpire("set").to_string(),
            "ERR invalid expire time in 'set' command"
        );
    }
}
