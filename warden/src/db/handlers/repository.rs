//! The user repository trait.
//!
//! A repository is the data access layer for user records. Implementations are expected to
//! provide their own concurrency safety (atomic row updates); callers issue one logical read
//! or write per operation and hold no locks across operations.

use crate::db::{errors::Result, models::users::User};
use crate::types::UserId;

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Get a user by ID
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Get a user by username (exact match)
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get the user whose pending reset token has the given digest
    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>>;

    /// Insert or update a user, keyed by ID.
    ///
    /// Fails with [`crate::db::errors::DbError::UniqueViolation`] when another user already
    /// holds the username or email.
    async fn save(&self, user: &User) -> Result<()>;

    /// Whether the backing schema is present
    async fn table_exists(&self) -> Result<bool>;

    /// Create the backing schema. Called once at startup when [`Self::table_exists`] is false.
    async fn ensure_schema(&self) -> Result<()>;
}
