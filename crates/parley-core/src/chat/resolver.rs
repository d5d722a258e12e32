//! Find-or-create chat resolution.
//!
//! A chat is created lazily the first time a message arrives for an unseen
//! identity key. Creation is not transactional with the message insert that
//! follows: a chat left without messages by a failed delivery is harmless and
//! is picked up again when the delivery is retried.

use chrono::Utc;
use parley_types::chat::{Chat, ChatIdentity, Participants};
use parley_types::error::RepositoryError;
use parley_types::identity::Role;
use tracing::{debug, info, warn};

use crate::chat::identity::IdentityResolver;
use crate::chat::repository::ChatRepository;

/// Resolves an identity key to its chat, creating the chat on first sight.
pub struct ChatResolver<'a, R: ChatRepository, U: IdentityResolver> {
    repo: &'a R,
    users: &'a U,
}

impl<'a, R: ChatRepository, U: IdentityResolver> ChatResolver<'a, R, U> {
    pub fn new(repo: &'a R, users: &'a U) -> Self {
        Self { repo, users }
    }

    /// Return the chat for `identity`, creating it if absent.
    ///
    /// `participants` is only consulted when a chat is created. If another
    /// writer creates the same key concurrently, the loser re-reads and
    /// returns the winner's record, so one key never yields two chats.
    pub async fn resolve(
        &self,
        identity: &ChatIdentity,
        participants: Participants,
    ) -> Result<Chat, RepositoryError> {
        let key = identity.key();

        if let Some(chat) = self.repo.get_chat_by_key(&key).await? {
            return Ok(chat);
        }

        let participants = self.vet_participants(&key, participants).await?;
        let chat = Chat::new(identity, participants, Utc::now());

        match self.repo.create_chat(&chat).await {
            Ok(created) => {
                info!(chat_key = %key, chat_id = %created.id, "Chat created");
                Ok(created)
            }
            Err(RepositoryError::Conflict(_)) => {
                debug!(chat_key = %key, "Chat created concurrently, re-reading");
                self.repo
                    .get_chat_by_key(&key)
                    .await?
                    .ok_or(RepositoryError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop an operator association that does not point at a staff user.
    async fn vet_participants(
        &self,
        key: &str,
        mut participants: Participants,
    ) -> Result<Participants, RepositoryError> {
        if let Some(operator_id) = participants.operator_id {
            let staff = match self.users.resolve_user(operator_id).await? {
                Some(user) => matches!(user.role, Role::Operator | Role::Admin),
                None => false,
            };
            if !staff {
                warn!(
                    chat_key = %key,
                    operator_id,
                    "Operator does not resolve to a staff user; chat created unassigned"
                );
                participants.operator_id = None;
            }
        }
        Ok(participants)
    }
}
