//! The per-delivery unit of work: decode, resolve chat, append message,
//! touch the chat timestamp, and classify the result into a broker outcome.

use chrono::Utc;
use parley_types::chat::ChatMessage;
use parley_types::config::IngestConfig;
use parley_types::error::RepositoryError;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::chat::identity::IdentityResolver;
use crate::chat::repository::ChatRepository;
use crate::chat::resolver::ChatResolver;
use crate::ingest::allocator::SequenceAllocator;
use crate::ingest::consumer::DeliveryHandler;
use crate::ingest::envelope::{self, DecodeError, DecodedMessage};

/// Errors from ingesting a single delivery.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Every insert attempt collided with another writer.
    #[error("no free sequence for chat '{chat_key}' after {attempts} attempts")]
    SequenceExhausted { chat_key: String, attempts: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Stored; remove from the queue.
    Ack,
    /// Permanently unprocessable; negative ack without requeue.
    Reject,
    /// Transient failure; negative ack with requeue.
    Requeue,
}

impl IngestError {
    /// Map the failure to the acknowledgment the broker should receive.
    pub fn outcome(&self) -> DeliveryOutcome {
        match self {
            IngestError::Decode(_) => DeliveryOutcome::Reject,
            IngestError::SequenceExhausted { .. } => DeliveryOutcome::Requeue,
            IngestError::Storage(e) if e.is_transient() => DeliveryOutcome::Requeue,
            IngestError::Storage(_) => DeliveryOutcome::Reject,
        }
    }
}

/// Orchestrates chat resolution, sequence allocation, and timestamp update.
///
/// Generic over `ChatRepository` and `IdentityResolver` to maintain clean
/// architecture (parley-core never depends on parley-infra).
pub struct IngestionPipeline<R: ChatRepository, U: IdentityResolver> {
    repo: R,
    users: U,
    max_sequence_attempts: u32,
}

impl<R: ChatRepository, U: IdentityResolver> IngestionPipeline<R, U> {
    pub fn new(repo: R, users: U, config: &IngestConfig) -> Self {
        Self {
            repo,
            users,
            max_sequence_attempts: config.max_sequence_attempts,
        }
    }

    /// Access the chat repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Store one decoded message at a unique sequence number in its chat.
    ///
    /// Redelivered messages are not deduplicated: each delivery becomes a
    /// new message at the next free sequence number.
    pub async fn ingest(&self, decoded: &DecodedMessage) -> Result<ChatMessage, IngestError> {
        let chat = ChatResolver::new(&self.repo, &self.users)
            .resolve(&decoded.identity, decoded.participants)
            .await?;

        let message = SequenceAllocator::new(&self.repo, self.max_sequence_attempts)
            .append(&chat, &decoded.message)
            .await?;

        if let Some(hint) = decoded.sequence_hint
            && hint != message.sequence
        {
            debug!(
                chat_key = %chat.key,
                sequence = message.sequence,
                sequence_hint = hint,
                "Stored sequence differs from producer hint"
            );
        }

        let touched_at = Utc::now().max(chat.created_at);
        self.repo.update_chat_timestamp(&chat.id, touched_at).await?;

        Ok(message)
    }

    /// Decode and ingest a raw payload, returning how to settle the delivery.
    pub async fn handle_payload(&self, payload: &[u8]) -> DeliveryOutcome {
        let decoded = match envelope::decode(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Rejecting undecodable delivery");
                return IngestError::Decode(e).outcome();
            }
        };

        let chat_key = decoded.identity.key();
        let message_id = decoded.message_id.as_deref().unwrap_or("-");

        match self.ingest(&decoded).await {
            Ok(message) => {
                debug!(
                    chat_key = %chat_key,
                    message_id,
                    sequence = message.sequence,
                    "Message ingested"
                );
                DeliveryOutcome::Ack
            }
            Err(e) => {
                let outcome = e.outcome();
                match outcome {
                    DeliveryOutcome::Requeue => {
                        warn!(chat_key = %chat_key, message_id, error = %e, "Ingestion failed, requeueing")
                    }
                    _ => {
                        error!(chat_key = %chat_key, message_id, error = %e, "Ingestion failed permanently, rejecting")
                    }
                }
                outcome
            }
        }
    }
}

impl<R: ChatRepository, U: IdentityResolver> DeliveryHandler for IngestionPipeline<R, U> {
    async fn handle(&self, payload: &[u8]) -> DeliveryOutcome {
        self.handle_payload(payload).await
    }
}
