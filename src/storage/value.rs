//! Stored Values
//!
//! A key holds exactly one of four value kinds. Command handlers reach the
//! concrete container through the `as_*` accessors, which turn a kind
//! mismatch into [`CommandError::WrongType`].

use crate::error::CommandError;
use crate::types::{Dict, QuickList, Set};

#[derive(Debug, Clone)]
pub enum Value {
    /// Binary-safe string, also used for integers, floats and bitmaps.
    String(Vec<u8>),
    List(QuickList),
    Set(Set),
    Hash(Dict),
}

/// The kind of a stored value, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
    Set,
    Hash,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::Hash => "hash",
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Hash(_) => ValueKind::Hash,
        }
    }

    /// True for a list, set or hash with no elements.
    ///
    /// Such values are never kept in the keyspace. An empty string is a
    /// legitimate value and does not count.
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Hash(dict) => dict.is_empty(),
        }
    }

    pub fn as_string(&self) -> Result<&[u8], CommandError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut Vec<u8>, CommandError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&QuickList, CommandError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut QuickList, CommandError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&Set, CommandError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut Set, CommandError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&Dict, CommandError> {
        match self {
            Value::Hash(dict) => Ok(dict),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut Dict, CommandError> {
        match self {
            Value::Hash(dict) => Ok(dict),
            _ => Err(CommandError::WrongType),
        }
    }
}
