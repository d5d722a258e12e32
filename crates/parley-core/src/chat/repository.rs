//! ChatRepository trait definition.
//!
//! The persistence boundary for chats and their sequenced messages. Adapters
//! must report a missing chat as `RepositoryError::NotFound` and a violated
//! uniqueness constraint as `RepositoryError::Conflict`; the ingestion
//! pipeline branches on both.

use chrono::{DateTime, Utc};
use parley_types::chat::{Chat, ChatMessage, ChatSummary};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat and message persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Look up a chat by its unique identity key.
    fn get_chat_by_key(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// Look up a chat by id.
    fn get_chat(
        &self,
        chat_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// Insert a new chat. Returns `Conflict` if the key is already taken.
    fn create_chat(
        &self,
        chat: &Chat,
    ) -> impl std::future::Future<Output = Result<Chat, RepositoryError>> + Send;

    /// Insert a message. Returns `Conflict` if `(chat_id, sequence)` is taken.
    fn create_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Advance the chat's `updated_at` to `at`. Never moves it backwards.
    ///
    /// Returns `NotFound` if the chat does not exist.
    fn update_chat_timestamp(
        &self,
        chat_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Highest stored sequence number for the chat, or 0 if it has none.
    fn last_sequence(
        &self,
        chat_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<i64, RepositoryError>> + Send;

    /// Chats assigned to an operator, most recently updated first.
    fn list_chats_for_operator(
        &self,
        operator_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Chat>, RepositoryError>> + Send;

    /// Chat summaries (chat plus latest message), most recently updated first.
    ///
    /// `None` lists every chat; `Some(id)` only the operator's chats.
    fn list_chat_summaries(
        &self,
        operator_id: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSummary>, RepositoryError>> + Send;

    /// Messages of a chat ordered by sequence ASC.
    fn get_messages(
        &self,
        chat_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;
}
