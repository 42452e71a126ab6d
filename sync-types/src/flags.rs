//! Bit flags exchanged with the messaging service.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Access rights granted to the application token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Permissions(u32);

impl Permissions {
    /// No rights.
    pub const NONE: Self = Self(0);
    /// Notifications.
    pub const NOTIFY: Self = Self(1);
    /// Friends list.
    pub const FRIENDS: Self = Self(2);
    /// Photos.
    pub const PHOTOS: Self = Self(4);
    /// Audio.
    pub const AUDIO: Self = Self(8);
    /// Video.
    pub const VIDEO: Self = Self(16);
    /// Status.
    pub const STATUS: Self = Self(1024);
    /// Notes.
    pub const NOTES: Self = Self(2048);
    /// Private messages. Required for long-poll sync.
    pub const MESSAGES: Self = Self(4096);
    /// Wall.
    pub const WALL: Self = Self(8192);
    /// Token does not expire.
    pub const OFFLINE: Self = Self(65536);
    /// Documents.
    pub const DOCS: Self = Self(131072);
    /// Communities.
    pub const GROUPS: Self = Self(262144);

    /// Build from a raw bitmask.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is granted.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Extra data requested from the long-poll server (`mode` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollMode(u32);

impl PollMode {
    /// Plain events.
    pub const NONE: Self = Self(0);
    /// Include attachments in new-message events.
    pub const INCLUDE_ATTACHMENTS: Self = Self(2);
    /// Extended event set.
    pub const INCLUDE_EXTENDED_EVENTS: Self = Self(8);
    /// Return `pts` with each batch.
    pub const RETURN_PTS: Self = Self(32);
    /// Platform id in friend-online events.
    pub const INCLUDE_ONLINE_EXTRA: Self = Self(64);

    /// Build from a raw bitmask.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for PollMode {
    fn default() -> Self {
        Self::INCLUDE_ATTACHMENTS
    }
}

impl BitOr for PollMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
