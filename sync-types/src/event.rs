//! Positional-array events returned by the long-poll server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event code discriminator, the first element of every wire event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum EventCode {
    /// `0,$message_id,0` - message deleted
    MessageDeleted = 0,
    /// `1,$message_id,$flags` - message flags replaced
    MessageFlagsReplaced = 1,
    /// `2,$message_id,$mask[,$user_id]` - message flags set
    MessageFlagsSet = 2,
    /// `3,$message_id,$mask[,$user_id]` - message flags cleared
    MessageFlagsClear = 3,
    /// `4,$message_id,$flags,$from_id,$timestamp,$subject,$text[,$attachments]` - new message
    NewMessage = 4,
    /// `6,$peer_id,$local_id` - incoming messages read up to `$local_id`
    IncomingMessagesRead = 6,
    /// `7,$peer_id,$local_id` - outgoing messages read up to `$local_id`
    OutgoingMessagesRead = 7,
    /// `8,-$user_id,$extra` - friend came online
    FriendOnline = 8,
    /// `9,-$user_id,$flags` - friend went offline
    FriendOffline = 9,
    /// `51,$chat_id,$self` - chat membership or topic changed
    ChatParameterChanged = 51,
    /// `61,$user_id,$flags` - user started typing in a dialog
    UserStartTyping = 61,
    /// `62,$user_id,$chat_id` - user started typing in a chat
    UserStartTypingInChat = 62,
    /// `70,$user_id,$call_id` - user placed a call
    UserCall = 70,
    /// `80,$count,0` - unread counter changed
    UnreadMessagesChanged = 80,
}

impl TryFrom<i64> for EventCode {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventCode::MessageDeleted),
            1 => Ok(EventCode::MessageFlagsReplaced),
            2 => Ok(EventCode::MessageFlagsSet),
            3 => Ok(EventCode::MessageFlagsClear),
            4 => Ok(EventCode::NewMessage),
            6 => Ok(EventCode::IncomingMessagesRead),
            7 => Ok(EventCode::OutgoingMessagesRead),
            8 => Ok(EventCode::FriendOnline),
            9 => Ok(EventCode::FriendOffline),
            51 => Ok(EventCode::ChatParameterChanged),
            61 => Ok(EventCode::UserStartTyping),
            62 => Ok(EventCode::UserStartTypingInChat),
            70 => Ok(EventCode::UserCall),
            80 => Ok(EventCode::UnreadMessagesChanged),
            other => Err(other),
        }
    }
}

/// A raw live event: `[code, field1, field2, ...]`.
///
/// Only the decoder in `sync-core` looks inside one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireEvent(Vec<Value>);

impl WireEvent {
    /// Wrap a positional array.
    pub fn new(fields: Vec<Value>) -> Self {
        Self(fields)
    }

    /// The raw numeric code, if the first element is an integer.
    pub fn raw_code(&self) -> Option<i64> {
        self.0.first().and_then(Value::as_i64)
    }

    /// Element at `index` (the code is index 0).
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Number of elements, including the code.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the array is empty (no code at all).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for WireEvent {
    fn from(fields: Vec<Value>) -> Self {
        Self(fields)
    }
}
