//! Per-chat sequence allocation with optimistic retry.
//!
//! The `(chat_id, sequence)` uniqueness constraint in the store is the single
//! source of truth. The allocator reads the current maximum, tries the next
//! slot, and on a conflict moves one slot further until the insert lands or
//! the attempt budget runs out. No lock is taken, so concurrent consumers and
//! broker redeliveries for the same chat interleave safely: sequences may
//! skip, they never repeat.

use chrono::Utc;
use parley_types::chat::{Chat, ChatMessage, NewChatMessage};
use parley_types::error::RepositoryError;
use tracing::debug;

use crate::chat::repository::ChatRepository;
use crate::ingest::pipeline::IngestError;

/// Appends messages to a chat at the next free sequence number.
pub struct SequenceAllocator<'a, R: ChatRepository> {
    repo: &'a R,
    max_attempts: u32,
}

impl<'a, R: ChatRepository> SequenceAllocator<'a, R> {
    /// `max_attempts` is clamped to at least one insert.
    pub fn new(repo: &'a R, max_attempts: u32) -> Self {
        Self {
            repo,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Persist `pending` in `chat` at a sequence number no other message holds.
    pub async fn append(
        &self,
        chat: &Chat,
        pending: &NewChatMessage,
    ) -> Result<ChatMessage, IngestError> {
        let mut candidate = self.repo.last_sequence(&chat.id).await? + 1;

        for attempt in 1..=self.max_attempts {
            let message = pending.at_sequence(chat.id, candidate, Utc::now());

            match self.repo.create_message(&message).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(
                            chat_key = %chat.key,
                            sequence = candidate,
                            attempt,
                            "Message stored after sequence conflicts"
                        );
                    }
                    return Ok(message);
                }
                Err(RepositoryError::Conflict(_)) => {
                    debug!(
                        chat_key = %chat.key,
                        sequence = candidate,
                        attempt,
                        "Sequence already taken, trying next"
                    );
                    candidate += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IngestError::SequenceExhausted {
            chat_key: chat.key.clone(),
            attempts: self.max_attempts,
        })
    }
}
