//! Cursor tracking for lpsync.
//!
//! This module provides the session's durable position:
//! - The history sequence cursor (`pts`), which never moves backwards
//! - The live time cursor (`ts`), adopted from every poll response
//! - The highest message id seen, used to drop duplicates
//!
//! Only the sequence cursor and the highest message id are worth persisting.
//! A fresh server descriptor always brings its own time cursor, so the live
//! cursor is deliberately left out of [`ResumePoint`].

use lpsync_types::{MessageId, SequenceCursor, TimeCursor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of both cursors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncCursor {
    /// Position in the durable history.
    pub sequence_number: SequenceCursor,
    /// Position in the live event stream.
    pub server_time_cursor: TimeCursor,
}

/// The state a caller persists between process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResumePoint {
    /// History cursor to continue catch-up from.
    pub sequence_number: SequenceCursor,
    /// Highest message id already delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_id: Option<MessageId>,
}

/// A server response tried to move the sequence cursor backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorRegression {
    /// Cursor currently held.
    pub current: SequenceCursor,
    /// Cursor the server offered.
    pub offered: SequenceCursor,
}

impl fmt::Display for CursorRegression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sequence cursor regressed from {} to {}",
            self.current, self.offered
        )
    }
}

impl std::error::Error for CursorRegression {}

/// Tracks the session cursors and the dedup high-water mark.
///
/// Owned by exactly one worker; everyone else sees [`SyncCursor`] and
/// [`ResumePoint`] snapshots.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    sequence: SequenceCursor,
    time: TimeCursor,
    max_message_id: Option<MessageId>,
    /// Set when the caller supplied a resume point; the descriptor's
    /// sequence cursor must then not override it.
    resumed: bool,
}

impl CursorTracker {
    /// Create a new tracker with no history seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker seeded from a persisted resume point.
    pub fn with_resume(resume: ResumePoint) -> Self {
        Self {
            sequence: resume.sequence_number,
            time: TimeCursor::default(),
            max_message_id: resume.max_message_id,
            resumed: true,
        }
    }

    /// Seed from a freshly resolved server descriptor.
    ///
    /// The descriptor always supplies the live time cursor. Its sequence
    /// cursor is used only when no resume point was given, so resuming never
    /// rewinds to the server's idea of "now".
    pub fn seed(&mut self, time: TimeCursor, sequence: Option<SequenceCursor>) {
        self.time = time;
        if !self.resumed {
            if let Some(sequence) = sequence {
                self.sequence = sequence;
            }
        }
    }

    /// Adopt the cursor returned with a history page.
    pub fn advance_sequence(&mut self, next: SequenceCursor) -> Result<(), CursorRegression> {
        if next < self.sequence {
            return Err(CursorRegression {
                current: self.sequence,
                offered: next,
            });
        }
        self.sequence = next;
        Ok(())
    }

    /// Adopt the cursor returned with a poll batch. Unconditional: the token
    /// is opaque and an empty batch still moves it.
    pub fn adopt_time_cursor(&mut self, next: TimeCursor) {
        self.time = next;
    }

    /// Record a message id. Returns `true` if it is new (strictly above the
    /// high-water mark) and should be emitted.
    pub fn observe(&mut self, id: MessageId) -> bool {
        match self.max_message_id {
            Some(max) if id <= max => false,
            _ => {
                self.max_message_id = Some(id);
                true
            }
        }
    }

    /// Current history cursor.
    pub fn sequence(&self) -> SequenceCursor {
        self.sequence
    }

    /// Current live cursor.
    pub fn time_cursor(&self) -> &TimeCursor {
        &self.time
    }

    /// Highest message id seen so far.
    pub fn max_message_id(&self) -> Option<MessageId> {
        self.max_message_id
    }

    /// Snapshot of both cursors.
    pub fn snapshot(&self) -> SyncCursor {
        SyncCursor {
            sequence_number: self.sequence,
            server_time_cursor: self.time.clone(),
        }
    }

    /// Snapshot of the persistable state.
    pub fn resume_point(&self) -> ResumePoint {
        ResumePoint {
            sequence_number: self.sequence,
            max_message_id: self.max_message_id,
        }
    }
}
