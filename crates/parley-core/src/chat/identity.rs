//! IdentityResolver trait definition.
//!
//! User records belong to the external user/auth subsystem. Parley only needs
//! to map a client or operator reference to a user record when it records a
//! chat's participants.

use parley_types::error::RepositoryError;
use parley_types::identity::UserRecord;

/// Maps a user id to the user record owned by the identity subsystem.
pub trait IdentityResolver: Send + Sync {
    /// Resolve a user by id. `Ok(None)` means the user does not exist.
    fn resolve_user(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<UserRecord>, RepositoryError>> + Send;
}
