//! # sync-types
//!
//! Wire format types for the lpsync long-poll message sync client.
//!
//! This crate provides the foundational types used across all lpsync crates:
//! - [`MessageId`], [`UserId`], [`SequenceCursor`], [`TimeCursor`] - Identity and ordering types
//! - [`ServerDescriptor`], [`HistoryPage`], [`PollBatch`] - Collaborator responses
//! - [`WireEvent`], [`EventCode`] - Positional-array live events
//! - [`Permissions`], [`PollMode`] - Access and request flags
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod flags;
mod ids;
mod messages;

pub use error::WireError;
pub use event::{EventCode, WireEvent};
pub use flags::{Permissions, PollMode};
pub use ids::{MessageId, SequenceCursor, TimeCursor, UserId};
pub use messages::{
    HistoryPage, HistoryRequest, Message, PollBatch, PollRequest, ServerDescriptor,
};
