//! Queue message envelope and its decoding.
//!
//! The envelope accepts both the documented snake_case field names and the
//! camelCase names emitted by the websocket chat service, e.g.:
//!
//! ```json
//! {"chatId": "c1", "username": "alice", "message": "hi", "sequence": 4,
//!  "timestamp": "2024-05-01T10:00:00Z", "messageId": "c1-1714557600-x1"}
//! ```
//!
//! Every decode failure is permanent: the same bytes will never decode on
//! redelivery.

use parley_types::chat::{ChatIdentity, NewChatMessage, Participants};
use serde::Deserialize;
use thiserror::Error;

/// Why a payload could not be turned into a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not UTF-8, not JSON, missing fields, or wrong field types.
    ///
    /// Only the position is kept: serde's message may quote payload values.
    #[error("malformed envelope ({category}) at line {line}, column {column}")]
    Malformed {
        category: &'static str,
        line: usize,
        column: usize,
    },

    /// Neither a chat key nor a client/operator pair was supplied.
    #[error("envelope has no chat identity")]
    MissingIdentity,

    #[error("envelope author is empty")]
    EmptyAuthor,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        let category = match err.classify() {
            serde_json::error::Category::Io => "io",
            serde_json::error::Category::Syntax => "syntax",
            serde_json::error::Category::Data => "data",
            serde_json::error::Category::Eof => "eof",
        };
        DecodeError::Malformed {
            category,
            line: err.line(),
            column: err.column(),
        }
    }
}

/// Raw queue payload as produced upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    #[serde(default, alias = "chat_id", alias = "chatId")]
    pub identity_key: Option<String>,

    #[serde(default, alias = "clientId")]
    pub client_id: Option<i64>,

    #[serde(default, alias = "operatorId")]
    pub operator_id: Option<i64>,

    #[serde(alias = "username")]
    pub author: String,

    #[serde(alias = "message")]
    pub content: String,

    /// Producer-side sequence. Advisory only; the allocator decides.
    #[serde(default, alias = "sequence")]
    pub sequence_hint: Option<i64>,

    #[serde(default, alias = "isManager")]
    pub from_operator: bool,

    /// Accepted for compatibility. Creation time is always server-assigned.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,

    #[serde(default, alias = "messageId")]
    pub message_id: Option<String>,
}

/// A validated envelope, ready for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub identity: ChatIdentity,
    /// Associations recorded if the chat has to be created.
    pub participants: Participants,
    pub message: NewChatMessage,
    pub sequence_hint: Option<i64>,
    pub message_id: Option<String>,
}

impl MessageEnvelope {
    /// Derive the chat identity: an explicit key wins over the participant pair.
    pub fn identity(&self) -> Option<ChatIdentity> {
        self.identity_key
            .as_deref()
            .and_then(ChatIdentity::external)
            .or(match (self.client_id, self.operator_id) {
                (Some(client_id), Some(operator_id)) => Some(ChatIdentity::Participants {
                    client_id,
                    operator_id,
                }),
                _ => None,
            })
    }

    /// Validate the envelope and split it into identity and message parts.
    pub fn into_decoded(self) -> Result<DecodedMessage, DecodeError> {
        let identity = self.identity().ok_or(DecodeError::MissingIdentity)?;

        let author = self.author.trim();
        if author.is_empty() {
            return Err(DecodeError::EmptyAuthor);
        }

        let participants = match identity {
            ChatIdentity::External(_) => Participants {
                client_id: self.client_id,
                operator_id: self.operator_id,
            },
            ChatIdentity::Participants { .. } => Participants::from(&identity),
        };

        Ok(DecodedMessage {
            message: NewChatMessage {
                author: author.to_string(),
                content: self.content,
                from_operator: self.from_operator,
            },
            identity,
            participants,
            sequence_hint: self.sequence_hint,
            message_id: self.message_id,
        })
    }
}

/// Decode a raw delivery payload.
pub fn decode(payload: &[u8]) -> Result<DecodedMessage, DecodeError> {
    serde_json::from_slice::<MessageEnvelope>(payload)?.into_decoded()
}
