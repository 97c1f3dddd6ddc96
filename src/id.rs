//! Stable vector identifiers.
//!
//! Integer and string ids coexist in the same store. A string that happens
//! to parse as an integer is never silently coerced into one — the tag is
//! preserved end to end, including through serialization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable identifier for a stored vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorId {
    /// An unsigned integer id, either caller-supplied or allocated from the
    /// store's internal counter.
    Int(u64),
    /// A caller-supplied string id. Never coerced to `Int`, even if it
    /// parses as one.
    Str(String),
}

impl VectorId {
    /// Returns the integer value if this id is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }

    /// Returns the string value if this id is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for VectorId {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for VectorId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for VectorId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}
