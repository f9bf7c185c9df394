//! In-process user repository, for development setups and tests.

use std::sync::Mutex;

use dashmap::DashMap;
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::UserRepository,
        models::users::User,
    },
    types::{UserId, abbrev_uuid},
};

/// Users kept in a concurrent map. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryUsers {
    users: DashMap<UserId, User>,
    // Serializes the uniqueness check with the write.
    write_lock: Mutex<()>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn find(&self, predicate: impl Fn(&User) -> bool) -> Option<User> {
        self.users.iter().find(|entry| predicate(entry.value())).map(|entry| entry.value().clone())
    }
}

fn unique_violation(constraint: &str, value: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some("users".to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\" ({value})"),
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryUsers {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        Ok(self.find(|u| u.reset_token.as_ref().is_some_and(|t| t.token_hash == token_hash)))
    }

    #[instrument(skip(self, user), fields(user_id = %abbrev_uuid(&user.id)), err)]
    async fn save(&self, user: &User) -> Result<()> {
        if user.username.is_empty() || user.email.is_empty() {
            return Err(DbError::CheckViolation {
                constraint: Some("users_not_empty".to_string()),
                table: Some("users".to_string()),
                message: "username and email must not be empty".to_string(),
            });
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| DbError::Other(anyhow::anyhow!("user store lock poisoned: {e}")))?;

        for entry in self.users.iter() {
            let other = entry.value();
            if other.id == user.id {
                continue;
            }
            if other.username == user.username {
                return Err(unique_violation("users_username_key", &user.username));
            }
            if other.email == user.email {
                return Err(unique_violation("users_email_key", &user.email));
            }
        }

        let mut record = user.clone();
        if let Some(existing) = self.users.get(&user.id) {
            record.created_at = existing.created_at;
        }
        record.updated_at = chrono::Utc::now();
        self.users.insert(record.id, record);

        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }
}
