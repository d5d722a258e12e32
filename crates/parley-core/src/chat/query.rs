//! Role-gated read access to chats, summaries, and message history.

use parley_types::chat::{Chat, ChatMessage, ChatSummary};
use parley_types::error::RepositoryError;
use parley_types::identity::{Claims, Role};
use thiserror::Error;
use uuid::Uuid;

use crate::chat::repository::ChatRepository;

/// Errors from the read API.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("chat not found")]
    NotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Read service exposed to the HTTP layer.
pub struct ChatQueryService<R: ChatRepository> {
    repo: R,
}

impl<R: ChatRepository> ChatQueryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Chats assigned to the calling operator. Operator-only.
    pub async fn chats_for(&self, claims: &Claims) -> Result<Vec<Chat>, AccessError> {
        match claims.role {
            Role::Operator => Ok(self.repo.list_chats_for_operator(claims.subject).await?),
            role => Err(AccessError::Forbidden(format!(
                "role '{role}' cannot list assigned chats"
            ))),
        }
    }

    /// Chat summaries: an operator sees its own, an admin sees every chat.
    pub async fn summaries_for(&self, claims: &Claims) -> Result<Vec<ChatSummary>, AccessError> {
        let scope = match claims.role {
            Role::Admin => None,
            Role::Operator => Some(claims.subject),
            Role::Client => {
                return Err(AccessError::Forbidden(
                    "clients cannot list chat summaries".to_string(),
                ));
            }
        };
        Ok(self.repo.list_chat_summaries(scope).await?)
    }

    /// Message history of one chat, ordered by sequence.
    ///
    /// Admins read any chat; operators and clients only chats they take part in.
    pub async fn messages_for(
        &self,
        claims: &Claims,
        chat_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, AccessError> {
        let chat = self
            .repo
            .get_chat(chat_id)
            .await?
            .ok_or(AccessError::NotFound)?;

        let allowed = match claims.role {
            Role::Admin => true,
            Role::Operator => chat.operator_id == Some(claims.subject),
            Role::Client => chat.client_id == Some(claims.subject),
        };
        if !allowed {
            return Err(AccessError::Forbidden(format!(
                "user {} is not a participant of chat {}",
                claims.subject, chat.id
            )));
        }

        Ok(self.repo.get_messages(chat_id, limit, offset).await?)
    }
}
