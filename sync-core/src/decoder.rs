//! Live event decoding for lpsync.
//!
//! Turns a positional wire array into one of three strongly distinguished
//! cases, once, at the boundary:
//! - [`DomainEvent::NewMessage`] - the only event the engine interprets
//! - [`DomainEvent::Ignored`] - a known protocol event with no handler yet
//! - [`DomainEvent::DecodeError`] - an unknown code or a broken array
//!
//! Keeping "known but uninteresting" apart from "unknown" lets the session
//! treat protocol drift as an error instead of silently dropping it.

use lpsync_types::{EventCode, Message, MessageId, UserId, WireEvent};
use serde_json::Value;
use thiserror::Error;

/// Offsets inside a new-message event.
mod offset {
    pub const MESSAGE_ID: usize = 1;
    pub const FLAGS: usize = 2;
    pub const FROM_ID: usize = 3;
    pub const TIMESTAMP: usize = 4;
    pub const SUBJECT: usize = 5;
    pub const TEXT: usize = 6;
    pub const ATTACHMENTS: usize = 7;
}

/// Minimum length of a new-message event (attachments are optional).
const NEW_MESSAGE_MIN_LEN: usize = offset::TEXT + 1;

/// Result of decoding one wire event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A message was added to a dialog.
    NewMessage(Message),
    /// A recognized event the engine does not interpret.
    Ignored(EventCode),
    /// The event violates the protocol contract.
    DecodeError(DecodeError),
}

/// Why a wire event could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The array had no elements.
    #[error("empty event array")]
    Empty,

    /// Element 0 was not an integer.
    #[error("event code is not an integer")]
    InvalidCode,

    /// Element 0 was an integer outside the known protocol.
    #[error("unrecognized event code {0}")]
    UnrecognizedCode(i64),

    /// A new-message event was too short.
    #[error("new message event has {len} elements, expected at least {expected}")]
    Truncated {
        /// Actual length.
        len: usize,
        /// Required length.
        expected: usize,
    },

    /// A field had the wrong JSON type or range.
    #[error("field {name} at offset {offset} is invalid")]
    InvalidField {
        /// Position in the array.
        offset: usize,
        /// Protocol name of the field.
        name: &'static str,
    },
}

/// Decode one wire event. Pure; decoding the same event twice gives the
/// same result.
pub fn decode(event: &WireEvent) -> DomainEvent {
    match decode_inner(event) {
        Ok(event) => event,
        Err(error) => DomainEvent::DecodeError(error),
    }
}

fn decode_inner(event: &WireEvent) -> Result<DomainEvent, DecodeError> {
    if event.is_empty() {
        return Err(DecodeError::Empty);
    }
    let raw = event.raw_code().ok_or(DecodeError::InvalidCode)?;
    let code = EventCode::try_from(raw).map_err(DecodeError::UnrecognizedCode)?;

    match code {
        EventCode::NewMessage => new_message(event).map(DomainEvent::NewMessage),
        EventCode::MessageDeleted
        | EventCode::MessageFlagsReplaced
        | EventCode::MessageFlagsSet
        | EventCode::MessageFlagsClear
        | EventCode::IncomingMessagesRead
        | EventCode::OutgoingMessagesRead
        | EventCode::FriendOnline
        | EventCode::FriendOffline
        | EventCode::ChatParameterChanged
        | EventCode::UserStartTyping
        | EventCode::UserStartTypingInChat
        | EventCode::UserCall
        | EventCode::UnreadMessagesChanged => Ok(DomainEvent::Ignored(code)),
    }
}

fn new_message(event: &WireEvent) -> Result<Message, DecodeError> {
    if event.len() < NEW_MESSAGE_MIN_LEN {
        return Err(DecodeError::Truncated {
            len: event.len(),
            expected: NEW_MESSAGE_MIN_LEN,
        });
    }

    let id = field(event, offset::MESSAGE_ID, "message_id", Value::as_u64)?;
    let flags = field(event, offset::FLAGS, "flags", Value::as_u64)?;
    let flags = u32::try_from(flags).map_err(|_| DecodeError::InvalidField {
        offset: offset::FLAGS,
        name: "flags",
    })?;
    let from_id = field(event, offset::FROM_ID, "from_id", Value::as_i64)?;
    let timestamp = field(event, offset::TIMESTAMP, "timestamp", Value::as_u64)?;
    let title = field(event, offset::SUBJECT, "subject", Value::as_str)?;
    let body = field(event, offset::TEXT, "text", Value::as_str)?;
    let attachments = event
        .get(offset::ATTACHMENTS)
        .filter(|value| !value.is_null())
        .cloned();

    Ok(Message {
        id: MessageId::new(id),
        from_user_id: UserId::new(from_id),
        timestamp,
        flags,
        title: title.to_string(),
        body: body.to_string(),
        attachments,
    })
}

fn field<'a, T>(
    event: &'a WireEvent,
    offset: usize,
    name: &'static str,
    read: impl Fn(&'a Value) -> Option<T>,
) -> Result<T, DecodeError> {
    event
        .get(offset)
        .and_then(read)
        .ok_or(DecodeError::InvalidField { offset, name })
}
