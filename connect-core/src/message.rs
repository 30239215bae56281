//! Direct messages with a one-way read flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::row;

/// A direct message between two users.
///
/// The read flag transitions false→true exactly once, and only an actor
/// acting as the receiver may set it. Deletion is a sender-only operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    /// Map a `messages` row. Rows missing any of the three identity
    /// columns are malformed and map to `None`.
    pub fn from_row(row: &Value) -> Option<Message> {
        Some(Message {
            id: row::uuid_field(row, "id")?,
            sender_id: row::uuid_field(row, "sender_id")?,
            receiver_id: row::uuid_field(row, "receiver_id")?,
            content: row::str_or_empty(row, "content"),
            created_at: row::timestamp_or_epoch(row, "created_at"),
            read: row::bool_or_false(row, "is_read"),
        })
    }

    /// Build the insert row for a new outgoing message. The id and
    /// timestamp are assigned remotely; new messages start unread.
    pub fn insert_row(sender: Uuid, receiver: Uuid, content: &str) -> Value {
        json!({
            "sender_id": sender.to_string(),
            "receiver_id": receiver.to_string(),
            "content": content,
            "is_read": false,
        })
    }

    /// Whether this message belongs to the conversation between `a` and `b`.
    pub fn between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}
