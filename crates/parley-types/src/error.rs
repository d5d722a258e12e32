use thiserror::Error;

/// Errors from repository operations (used by trait definitions in parley-core).
///
/// Adapters classify driver errors into these kinds so callers never inspect
/// engine-specific error text.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store could not be reached (connection, pool exhaustion, lock timeout).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_) | RepositoryError::Conflict(_))
    }
}
