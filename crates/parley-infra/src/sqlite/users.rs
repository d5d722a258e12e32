//! Read-only user lookups for participant vetting.

use parley_core::chat::identity::IdentityResolver;
use parley_types::error::RepositoryError;
use parley_types::identity::{Role, UserRecord};
use sqlx::Row;

use super::classify_sqlx_error;
use super::pool::DatabasePool;

/// `IdentityResolver` over the shared `users` table.
#[derive(Clone)]
pub struct SqliteIdentityResolver {
    pool: DatabasePool,
}

impl SqliteIdentityResolver {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl IdentityResolver for SqliteIdentityResolver {
    async fn resolve_user(&self, user_id: i64) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query("SELECT id, role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(classify_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row
            .try_get("id")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let role: Role = role.parse().map_err(RepositoryError::Query)?;

        Ok(Some(UserRecord { id, role }))
    }
}
