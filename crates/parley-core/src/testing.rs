//! In-memory fakes shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parley_types::chat::{Chat, ChatMessage, ChatSummary};
use parley_types::error::RepositoryError;
use parley_types::identity::{Role, UserRecord};
use uuid::Uuid;

use crate::chat::identity::IdentityResolver;
use crate::chat::repository::ChatRepository;

#[derive(Default)]
struct Tables {
    chats: Vec<Chat>,
    messages: Vec<ChatMessage>,
}

/// `ChatRepository` backed by vectors behind a mutex.
///
/// Uniqueness of `chats.key` and `(chat_id, sequence)` is enforced under the
/// lock, so concurrent callers observe the same conflicts a database would.
#[derive(Default)]
pub struct MemoryChatRepository {
    tables: Mutex<Tables>,
    /// Number of upcoming `create_message` calls that fail with `Conflict`.
    forced_conflicts: AtomicU32,
    /// When set, every call fails with `Unavailable`.
    unavailable: AtomicBool,
    /// Number of upcoming `get_chat_by_key` calls that report a miss.
    forced_misses: AtomicU32,
    insert_attempts: AtomicU32,
}

impl MemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn force_misses(&self, count: u32) {
        self.forced_misses.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.tables.lock().unwrap().chats.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.tables.lock().unwrap().messages.clone()
    }

    pub fn sequences(&self, chat_id: &Uuid) -> Vec<i64> {
        let mut seqs: Vec<i64> = self
            .tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| &m.chat_id == chat_id)
            .map(|m| m.sequence)
            .collect();
        seqs.sort_unstable();
        seqs
    }

    pub fn insert_chat(&self, chat: Chat) {
        self.tables.lock().unwrap().chats.push(chat);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("database is locked".to_string()))
        } else {
            Ok(())
        }
    }

    fn take_forced(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ChatRepository for MemoryChatRepository {
    async fn get_chat_by_key(&self, key: &str) -> Result<Option<Chat>, RepositoryError> {
        self.check_available()?;
        tokio::task::yield_now().await;
        if Self::take_forced(&self.forced_misses) {
            return Ok(None);
        }
        let tables = self.tables.lock().unwrap();
        Ok(tables.chats.iter().find(|c| c.key == key).cloned())
    }

    async fn get_chat(&self, chat_id: &Uuid) -> Result<Option<Chat>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.chats.iter().find(|c| &c.id == chat_id).cloned())
    }

    async fn create_chat(&self, chat: &Chat) -> Result<Chat, RepositoryError> {
        self.check_available()?;
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock().unwrap();
        if tables.chats.iter().any(|c| c.key == chat.key) {
            return Err(RepositoryError::Conflict("chats.chat_key".to_string()));
        }
        tables.chats.push(chat.clone());
        Ok(chat.clone())
    }

    async fn create_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if Self::take_forced(&self.forced_conflicts) {
            return Err(RepositoryError::Conflict("idx_chat_sequence".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        if tables
            .messages
            .iter()
            .any(|m| m.chat_id == message.chat_id && m.sequence == message.sequence)
        {
            return Err(RepositoryError::Conflict("idx_chat_sequence".to_string()));
        }
        tables.messages.push(message.clone());
        Ok(())
    }

    async fn update_chat_timestamp(
        &self,
        chat_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();
        let chat = tables
            .chats
            .iter_mut()
            .find(|c| &c.id == chat_id)
            .ok_or(RepositoryError::NotFound)?;
        chat.updated_at = chat.updated_at.max(at);
        Ok(())
    }

    async fn last_sequence(&self, chat_id: &Uuid) -> Result<i64, RepositoryError> {
        self.check_available()?;
        tokio::task::yield_now().await;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| &m.chat_id == chat_id)
            .map(|m| m.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn list_chats_for_operator(&self, operator_id: i64) -> Result<Vec<Chat>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        let mut chats: Vec<Chat> = tables
            .chats
            .iter()
            .filter(|c| c.operator_id == Some(operator_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn list_chat_summaries(
        &self,
        operator_id: Option<i64>,
    ) -> Result<Vec<ChatSummary>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        let mut summaries: Vec<ChatSummary> = tables
            .chats
            .iter()
            .filter(|c| operator_id.is_none() || c.operator_id == operator_id)
            .map(|c| {
                let last = tables
                    .messages
                    .iter()
                    .filter(|m| m.chat_id == c.id)
                    .max_by_key(|m| m.sequence);
                ChatSummary {
                    chat_id: c.id,
                    chat_key: c.key.clone(),
                    status: c.status.clone(),
                    operator_id: c.operator_id,
                    last_message: last.map(|m| m.content.clone()),
                    last_sequence: last.map(|m| m.sequence),
                    updated_at: c.updated_at,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn get_messages(
        &self,
        chat_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        let mut messages: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| &m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sequence);
        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(messages.into_iter().skip(offset).take(limit).collect())
    }
}

/// `IdentityResolver` over a fixed set of users.
#[derive(Default)]
pub struct MemoryDirectory {
    users: HashMap<i64, UserRecord>,
}

impl MemoryDirectory {
    pub fn with_user(mut self, id: i64, role: Role) -> Self {
        self.users.insert(id, UserRecord { id, role });
        self
    }
}

impl IdentityResolver for MemoryDirectory {
    async fn resolve_user(&self, user_id: i64) -> Result<Option<UserRecord>, RepositoryError> {
        Ok(self.users.get(&user_id).cloned())
    }
}
