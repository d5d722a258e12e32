//! Chat, message, and chat summary types for Parley.
//!
//! These types model support conversations between a client and an operator:
//! the chat record keyed by a stable identity key, the messages appended to it
//! under a per-chat sequence number, and the summaries served to operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// Status assigned to chats created lazily by the ingestion pipeline.
pub const DEFAULT_CHAT_STATUS: &str = "open";

/// Namespace prefix for externally supplied chat keys.
pub const EXTERNAL_KEY_PREFIX: &str = "ext:";

/// The stable identity a chat is resolved by.
///
/// Legacy producers address chats by an externally supplied string; newer
/// producers address them by the client/operator pair taking part in the
/// conversation. Both reduce to a single unique `chat_key`; external keys
/// carry the [`EXTERNAL_KEY_PREFIX`] so no external key can ever equal a
/// participant-pair key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatIdentity {
    /// Externally supplied chat id (trimmed, never empty).
    External(String),
    /// A client/operator pair.
    Participants { client_id: i64, operator_id: i64 },
}

impl ChatIdentity {
    /// Build an external identity, rejecting keys that are blank after trimming.
    pub fn external(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            None
        } else {
            Some(ChatIdentity::External(key.to_string()))
        }
    }

    /// The canonical key stored in `chats.chat_key`.
    pub fn key(&self) -> String {
        match self {
            ChatIdentity::External(key) => format!("{EXTERNAL_KEY_PREFIX}{key}"),
            ChatIdentity::Participants {
                client_id,
                operator_id,
            } => format!("client:{client_id}/operator:{operator_id}"),
        }
    }
}

impl fmt::Display for ChatIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Optional client/operator association recorded when a chat is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub client_id: Option<i64>,
    pub operator_id: Option<i64>,
}

impl From<&ChatIdentity> for Participants {
    fn from(identity: &ChatIdentity) -> Self {
        match identity {
            ChatIdentity::External(_) => Participants::default(),
            ChatIdentity::Participants {
                client_id,
                operator_id,
            } => Participants {
                client_id: Some(*client_id),
                operator_id: Some(*operator_id),
            },
        }
    }
}

/// A support conversation.
///
/// `updated_at` is bumped on every accepted message and never precedes
/// `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    /// Unique identity key (see [`ChatIdentity::key`]).
    pub key: String,
    /// Free-text state, e.g. `open` or `closed`.
    pub status: String,
    pub client_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// A fresh chat for `identity`, created and updated at `now`.
    pub fn new(identity: &ChatIdentity, participants: Participants, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            key: identity.key(),
            status: DEFAULT_CHAT_STATUS.to_string(),
            client_id: participants.client_id,
            operator_id: participants.operator_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A message stored within a chat.
///
/// `(chat_id, sequence)` is unique. Sequences start at 1 and increase per
/// chat; gaps are possible, duplicates are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    /// Author display name.
    pub author: String,
    pub content: String,
    /// Whether the operator side authored this message.
    pub from_operator: bool,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// The unsequenced part of a message waiting to be appended to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub author: String,
    pub content: String,
    pub from_operator: bool,
}

impl NewChatMessage {
    /// Materialize this message at a candidate sequence number.
    pub fn at_sequence(&self, chat_id: Uuid, sequence: i64, now: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Uuid::now_v7(),
            chat_id,
            author: self.author.clone(),
            content: self.content.clone(),
            from_operator: self.from_operator,
            sequence,
            created_at: now,
        }
    }
}

/// One row of an operator's chat overview: the chat and its latest message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: Uuid,
    pub chat_key: String,
    pub status: String,
    pub operator_id: Option<i64>,
    /// Content of the highest-sequence message, if any.
    pub last_message: Option<String>,
    pub last_sequence: Option<i64>,
    pub updated_at: DateTime<Utc>,
}
