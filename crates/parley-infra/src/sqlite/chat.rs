//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `parley-core` with raw queries, private
//! Row structs, and split reader/writer pool usage. Timestamps are stored as
//! fixed-width RFC 3339 text so lexical order matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use parley_core::chat::repository::ChatRepository;
use parley_types::chat::{Chat, ChatMessage, ChatSummary};
use parley_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::classify_sqlx_error;
use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
#[derive(Clone)]
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    id: String,
    chat_key: String,
    status: String,
    client_id: Option<i64>,
    operator_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_key: row.try_get("chat_key")?,
            status: row.try_get("status")?,
            client_id: row.try_get("client_id")?,
            operator_id: row.try_get("operator_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, RepositoryError> {
        Ok(Chat {
            id: parse_uuid(&self.id, "chat id")?,
            key: self.chat_key,
            status: self.status,
            client_id: self.client_id,
            operator_id: self.operator_id,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    chat_id: String,
    author: String,
    content: String,
    from_operator: bool,
    sequence: i64,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            author: row.try_get("author")?,
            content: row.try_get("content")?,
            from_operator: row.try_get("from_operator")?,
            sequence: row.try_get("sequence")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        Ok(ChatMessage {
            id: parse_uuid(&self.id, "message id")?,
            chat_id: parse_uuid(&self.chat_id, "chat_id")?,
            author: self.author,
            content: self.content,
            from_operator: self.from_operator,
            sequence: self.sequence,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct SummaryRow {
    id: String,
    chat_key: String,
    status: String,
    operator_id: Option<i64>,
    last_message: Option<String>,
    last_sequence: Option<i64>,
    updated_at: String,
}

impl SummaryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_key: row.try_get("chat_key")?,
            status: row.try_get("status")?,
            operator_id: row.try_get("operator_id")?,
            last_message: row.try_get("last_message")?,
            last_sequence: row.try_get("last_sequence")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_summary(self) -> Result<ChatSummary, RepositoryError> {
        Ok(ChatSummary {
            chat_id: parse_uuid(&self.id, "chat id")?,
            chat_key: self.chat_key,
            status: self.status,
            operator_id: self.operator_id,
            last_message: self.last_message,
            last_sequence: self.last_sequence,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_rows<T, R>(
    rows: &[sqlx::sqlite::SqliteRow],
    from_row: impl Fn(&sqlx::sqlite::SqliteRow) -> Result<R, sqlx::Error>,
    into: impl Fn(R) -> Result<T, RepositoryError>,
) -> Result<Vec<T>, RepositoryError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let raw = from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        out.push(into(raw)?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn get_chat_by_key(&self, key: &str) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE chat_key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(classify_sqlx_error)?;

        row.map(|row| {
            ChatRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_chat()
        })
        .transpose()
    }

    async fn get_chat(&self, chat_id: &Uuid) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(classify_sqlx_error)?;

        row.map(|row| {
            ChatRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_chat()
        })
        .transpose()
    }

    async fn create_chat(&self, chat: &Chat) -> Result<Chat, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chats (id, chat_key, status, client_id, operator_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(chat.id.to_string())
        .bind(&chat.key)
        .bind(&chat.status)
        .bind(chat.client_id)
        .bind(chat.operator_id)
        .bind(format_datetime(&chat.created_at))
        .bind(format_datetime(&chat.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(chat.clone())
    }

    async fn create_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_messages (id, chat_id, author, content, from_operator, sequence, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.chat_id.to_string())
        .bind(&message.author)
        .bind(&message.content)
        .bind(message.from_operator)
        .bind(message.sequence)
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(())
    }

    async fn update_chat_timestamp(
        &self,
        chat_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chats SET updated_at = MAX(updated_at, ?) WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(chat_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(classify_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn last_sequence(&self, chat_id: &Uuid) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) AS last_seq FROM chat_messages WHERE chat_id = ?",
        )
        .bind(chat_id.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(classify_sqlx_error)?;

        row.try_get("last_seq")
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn list_chats_for_operator(&self, operator_id: i64) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chats WHERE operator_id = ? ORDER BY updated_at DESC")
            .bind(operator_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(classify_sqlx_error)?;

        map_rows(&rows, ChatRow::from_row, ChatRow::into_chat)
    }

    async fn list_chat_summaries(
        &self,
        operator_id: Option<i64>,
    ) -> Result<Vec<ChatSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT c.id, c.chat_key, c.status, c.operator_id, c.updated_at,
                      m.content AS last_message, m.sequence AS last_sequence
               FROM chats c
               LEFT JOIN chat_messages m
                 ON m.chat_id = c.id
                AND m.sequence = (SELECT MAX(sequence) FROM chat_messages WHERE chat_id = c.id)
               WHERE ?1 IS NULL OR c.operator_id = ?1
               ORDER BY c.updated_at DESC"#,
        )
        .bind(operator_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(classify_sqlx_error)?;

        map_rows(&rows, SummaryRow::from_row, SummaryRow::into_summary)
    }

    async fn get_messages(
        &self,
        chat_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        // SQLite treats a negative LIMIT as unbounded.
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE chat_id = ? ORDER BY sequence ASC LIMIT ? OFFSET ?",
        )
        .bind(chat_id.to_string())
        .bind(limit.unwrap_or(-1))
        .bind(offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(classify_sqlx_error)?;

        map_rows(&rows, MessageRow::from_row, MessageRow::into_message)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Duration;
    use parley_core::ingest::pipeline::{DeliveryOutcome, IngestionPipeline};
    use parley_types::chat::{ChatIdentity, NewChatMessage, Participants};
    use parley_types::config::IngestConfig;

    use super::*;
    use crate::sqlite::pool::test_support::temp_pool;
    use crate::sqlite::users::SqliteIdentityResolver;

    fn legacy_chat(key: &str) -> Chat {
        Chat::new(
            &ChatIdentity::external(key).unwrap(),
            Participants::default(),
            Utc::now(),
        )
    }

    fn pending(content: &str) -> NewChatMessage {
        NewChatMessage {
            author: "alice".to_string(),
            content: content.to_string(),
            from_operator: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_chat() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let chat = legacy_chat("c1");
        repo.create_chat(&chat).await.unwrap();

        let by_key = repo.get_chat_by_key("ext:c1").await.unwrap().unwrap();
        assert_eq!(by_key.id, chat.id);
        assert_eq!(by_key.status, "open");
        assert_eq!(by_key.client_id, None);

        let by_id = repo.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(by_id.key, "ext:c1");

        assert!(repo.get_chat_by_key("missing").await.unwrap().is_none());
        assert!(repo.get_chat(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_chat_key_is_conflict() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        repo.create_chat(&legacy_chat("c1")).await.unwrap();

        let err = repo.create_chat(&legacy_chat("c1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_duplicate_sequence_is_conflict() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let chat = legacy_chat("c1");
        repo.create_chat(&chat).await.unwrap();

        repo.create_message(&pending("a").at_sequence(chat.id, 1, Utc::now()))
            .await
            .unwrap();
        let err = repo
            .create_message(&pending("b").at_sequence(chat.id, 1, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)), "got {err:?}");

        // Same sequence in another chat is fine.
        let other = legacy_chat("c2");
        repo.create_chat(&other).await.unwrap();
        repo.create_message(&pending("c").at_sequence(other.id, 1, Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_message_for_missing_chat_is_query_error() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let err = repo
            .create_message(&pending("orphan").at_sequence(Uuid::now_v7(), 1, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_last_sequence() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let chat = legacy_chat("c1");
        repo.create_chat(&chat).await.unwrap();

        assert_eq!(repo.last_sequence(&chat.id).await.unwrap(), 0);
        for seq in [1, 2, 5] {
            repo.create_message(&pending("x").at_sequence(chat.id, seq, Utc::now()))
                .await
                .unwrap();
        }
        assert_eq!(repo.last_sequence(&chat.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_update_timestamp_never_moves_backwards() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let chat = legacy_chat("c1");
        repo.create_chat(&chat).await.unwrap();

        let later = chat.created_at + Duration::seconds(10);
        repo.update_chat_timestamp(&chat.id, later).await.unwrap();
        repo.update_chat_timestamp(&chat.id, chat.created_at)
            .await
            .unwrap();

        let stored = repo.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(format_datetime(&stored.updated_at), format_datetime(&later));

        let err = repo
            .update_chat_timestamp(&Uuid::now_v7(), later)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_messages_ordered_by_sequence_with_paging() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let chat = legacy_chat("c1");
        repo.create_chat(&chat).await.unwrap();

        for seq in [3, 1, 2] {
            repo.create_message(&pending(&format!("m{seq}")).at_sequence(chat.id, seq, Utc::now()))
                .await
                .unwrap();
        }

        let all = repo.get_messages(&chat.id, None, None).await.unwrap();
        let seqs: Vec<i64> = all.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(all[0].content, "m1");
        assert_eq!(all[0].author, "alice");

        let page = repo.get_messages(&chat.id, Some(1), Some(1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_operator_chats_and_summaries_newest_first() {
        let repo = SqliteChatRepository::new(temp_pool().await);
        let base = Utc::now();

        let mut older = Chat::new(
            &ChatIdentity::Participants {
                client_id: 7,
                operator_id: 3,
            },
            Participants {
                client_id: Some(7),
                operator_id: Some(3),
            },
            base,
        );
        older.updated_at = base + Duration::seconds(1);
        let mut newer = Chat::new(
            &ChatIdentity::external("legacy").unwrap(),
            Participants {
                client_id: None,
                operator_id: Some(3),
            },
            base,
        );
        newer.updated_at = base + Duration::seconds(2);
        let unassigned = legacy_chat("nobody");

        for chat in [&older, &newer, &unassigned] {
            repo.create_chat(chat).await.unwrap();
        }
        for (seq, text) in [(1, "first"), (2, "second")] {
            repo.create_message(&pending(text).at_sequence(older.id, seq, Utc::now()))
                .await
                .unwrap();
        }

        let chats = repo.list_chats_for_operator(3).await.unwrap();
        let ids: Vec<Uuid> = chats.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let summaries = repo.list_chat_summaries(Some(3)).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].chat_id, newer.id);
        assert_eq!(summaries[0].last_message, None);
        assert_eq!(summaries[1].last_message.as_deref(), Some("second"));
        assert_eq!(summaries[1].last_sequence, Some(2));

        let all = repo.list_chat_summaries(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingestion_yields_distinct_sequences() {
        const DELIVERIES: usize = 16;
        let pool = temp_pool().await;
        let pipeline = Arc::new(IngestionPipeline::new(
            SqliteChatRepository::new(pool.clone()),
            SqliteIdentityResolver::new(pool),
            &IngestConfig::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..DELIVERIES {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                let payload = format!(r#"{{"chat_id": "hot", "author": "alice", "content": "m{i}"}}"#);
                pipeline.handle_payload(payload.as_bytes()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), DeliveryOutcome::Ack);
        }

        let repo = pipeline.repo();
        let chat = repo.get_chat_by_key("ext:hot").await.unwrap().unwrap();
        let messages = repo.get_messages(&chat.id, None, None).await.unwrap();
        assert_eq!(messages.len(), DELIVERIES);
        let distinct: HashSet<i64> = messages.iter().map(|m| m.sequence).collect();
        assert_eq!(distinct.len(), DELIVERIES);
        assert!(chat.updated_at >= chat.created_at);
    }
}
