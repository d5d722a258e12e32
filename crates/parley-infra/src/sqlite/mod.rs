//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod chat;
pub mod pool;
pub mod users;

use parley_types::error::RepositoryError;

/// Extended result codes reported while another connection holds the lock.
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

/// Map a driver error to a repository error kind.
///
/// Uniqueness violations become `Conflict`, lock contention and pool or I/O
/// failures become `Unavailable`, everything else is a `Query` error.
pub(crate) fn classify_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| BUSY_CODES.contains(&code.as_ref())) =>
        {
            RepositoryError::Unavailable(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => RepositoryError::Unavailable(err.to_string()),
        _ => RepositoryError::Query(err.to_string()),
    }
}
