//! Identity and ordering types for lpsync.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-assigned message identifier.
///
/// Identifiers grow with arrival order, which is what makes the
/// highest-seen id usable for deduplication.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Create a MessageId from its numeric value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this MessageId.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

/// Identifier of a user (or, for large values, a group chat peer).
///
/// Signed because some live events carry negated user ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a UserId from its numeric value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this UserId.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// Position in the durable message history (`pts`).
///
/// Assigned by the server and monotonically non-decreasing. This is the
/// cursor a client persists to resume catch-up after a restart.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SequenceCursor(u64);

impl SequenceCursor {
    /// Create a new SequenceCursor with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this SequenceCursor.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Create a SequenceCursor representing "no history seen yet".
    pub fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SequenceCursor({})", self.0)
    }
}

/// Position in the live event stream (`ts`).
///
/// Opaque continuation token. The service sends it as a number, but nothing
/// in the engine does arithmetic on it, so it is carried as text.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(transparent)]
pub struct TimeCursor(String);

impl TimeCursor {
    /// Create a TimeCursor from its textual form.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for TimeCursor {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

impl fmt::Display for TimeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TimeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeCursor({})", self.0)
    }
}
