//! Collaborator requests and responses for lpsync.
//!
//! Responses arrive as raw JSON (`serde_json::Value`) from the transport and
//! are validated here, so a structurally broken payload is detected once at
//! the boundary instead of surfacing as a panic deep in the engine.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{MessageId, PollMode, SequenceCursor, TimeCursor, UserId, WireError, WireEvent};

/// A private message, inbound or outbound.
///
/// Deserializes from the history API's object shape; the live decoder in
/// `sync-core` builds the same type from a positional event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id; identity of the message
    pub id: MessageId,
    /// Author (or dialog peer for outbound messages)
    #[serde(rename = "user_id")]
    pub from_user_id: UserId,
    /// Unix timestamp (seconds)
    #[serde(rename = "date")]
    pub timestamp: u64,
    /// Flag bits from the live event; zero for history messages
    #[serde(default)]
    pub flags: u32,
    /// Subject line (chat title for group chats)
    #[serde(default)]
    pub title: String,
    /// Message text
    #[serde(default)]
    pub body: String,
    /// Opaque attachment descriptor, when the server sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Value>,
}

/// Coordinates of the live-poll endpoint plus the starting cursors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptor {
    /// Long-poll server host/path
    pub host: String,
    /// Session key bound to the poll server
    pub access_key: String,
    /// Time cursor to start live polling from
    pub initial_time_cursor: TimeCursor,
    /// History cursor, present when it was requested
    pub initial_sequence_number: Option<SequenceCursor>,
}

#[derive(Deserialize)]
struct RawServer {
    key: Option<String>,
    server: Option<String>,
    ts: Option<TimeCursor>,
    pts: Option<SequenceCursor>,
}

impl ServerDescriptor {
    /// Validate a `{ key, server, ts, pts? }` response.
    ///
    /// `pts` is mandatory when `want_sequence_cursor` was set on the request.
    pub fn from_value(value: Value, want_sequence_cursor: bool) -> Result<Self, WireError> {
        let raw: RawServer = serde_json::from_value(value)?;

        let access_key = non_empty(raw.key, "key")?;
        let host = non_empty(raw.server, "server")?;
        let initial_time_cursor = raw.ts.ok_or(WireError::MissingField("ts"))?;
        if want_sequence_cursor && raw.pts.is_none() {
            return Err(WireError::MissingField("pts"));
        }

        Ok(Self {
            host,
            access_key,
            initial_time_cursor,
            initial_sequence_number: raw.pts,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, WireError> {
    match value {
        Some(s) if !s.is_empty() => Ok(s),
        Some(_) => Err(WireError::InvalidField {
            field,
            reason: "empty string".into(),
        }),
        None => Err(WireError::MissingField(field)),
    }
}

/// Parameters of one history page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRequest {
    /// Time cursor from the server descriptor
    pub ts: TimeCursor,
    /// Sequence cursor to continue from
    pub pts: SequenceCursor,
    /// Highest message id already held; the server excludes older ones
    #[serde(rename = "max_msg_id", skip_serializing_if = "Option::is_none")]
    pub max_message_id: Option<MessageId>,
    /// Messages per page
    #[serde(rename = "msgs_limit")]
    pub messages_limit: u32,
    /// Event budget before the server refuses the request
    pub events_limit: u32,
    /// Truncate message bodies to this many characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_length: Option<u32>,
    /// Only history from users currently online
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub onlines: bool,
}

/// One page of backlog.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    /// Messages in server order
    pub messages: Vec<Message>,
    /// Whether another page is pending
    pub has_more: bool,
    /// Cursor to request the next page with
    pub next_sequence_number: SequenceCursor,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageList {
    Plain(Vec<Message>),
    Wrapped { items: Vec<Message> },
}

#[derive(Deserialize)]
struct RawHistory {
    #[serde(alias = "pts")]
    new_pts: Option<SequenceCursor>,
    #[serde(default, deserialize_with = "int_flag")]
    more: bool,
    messages: Option<MessageList>,
}

impl HistoryPage {
    /// Validate a `{ new_pts, more, messages }` response.
    ///
    /// A JSON `null` means the collaborator had nothing usable and yields
    /// `Ok(None)`; that is a transient condition, not an empty page.
    pub fn from_value(value: Value) -> Result<Option<Self>, WireError> {
        if value.is_null() {
            return Ok(None);
        }
        let raw: RawHistory = serde_json::from_value(value)?;

        let next_sequence_number = raw.new_pts.ok_or(WireError::MissingField("new_pts"))?;
        let messages = match raw.messages.ok_or(WireError::MissingField("messages"))? {
            MessageList::Plain(items) | MessageList::Wrapped { items } => items,
        };

        Ok(Some(Self {
            messages,
            has_more: raw.more,
            next_sequence_number,
        }))
    }
}

/// The service sends booleans as `0`/`1`.
fn int_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Int(n) => n != 0,
    })
}

/// Parameters of one long-poll request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollRequest {
    /// Poll server host/path (not a query parameter)
    #[serde(skip)]
    pub server: String,
    /// Session key from the descriptor
    pub key: String,
    /// Time cursor to wait after
    pub ts: TimeCursor,
    /// Seconds the server may hold the request open
    #[serde(rename = "wait")]
    pub wait_secs: u32,
    /// Extra data flags
    pub mode: PollMode,
}

/// One long-poll response.
#[derive(Debug, Clone, PartialEq)]
pub struct PollBatch {
    /// Cursor to wait after on the next request
    pub ts: TimeCursor,
    /// Events in server order (possibly none)
    pub updates: Vec<WireEvent>,
}

#[derive(Deserialize)]
struct RawPoll {
    ts: Option<TimeCursor>,
    updates: Option<Vec<WireEvent>>,
    failed: Option<i64>,
}

impl PollBatch {
    /// Validate a `{ ts, updates }` response.
    pub fn from_value(value: Value) -> Result<Self, WireError> {
        let raw: RawPoll = serde_json::from_value(value)?;
        if let Some(code) = raw.failed {
            return Err(WireError::PollFailed(code));
        }

        Ok(Self {
            ts: raw.ts.ok_or(WireError::MissingField("ts"))?,
            updates: raw.updates.ok_or(WireError::MissingField("updates"))?,
        })
    }
}
