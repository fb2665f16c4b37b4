//! Value Data Structures
//!
//! The containers stored under keys:
//!
//! - `list`: paged doubly-linked list ([`QuickList`])
//! - `set`: unordered unique members ([`Set`]) and set algebra
//! - `dict`: field/value mapping for hashes ([`Dict`])
//! - `bitmap`: bit-level helpers over string values

pub mod bitmap;
pub mod dict;
pub mod list;
pub mod set;

pub use dict::Dict;
pub use list::{Cursor, QuickList};
pub use set::Set;
