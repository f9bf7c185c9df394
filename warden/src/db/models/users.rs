//! Datastore models for users.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{Role, UserId};

/// A pending reset/activation token bound to a user.
///
/// Only the digest of the token value is kept; the value itself leaves the process once,
/// in the notification or in the registration response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReset {
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
}

/// A user identity record.
///
/// Deliberately not `Serialize`: the password hash must never leave the process. API
/// responses go through [`crate::api::models::users::UserResponse`].
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string. `None` until the account has been activated with a password.
    pub password_hash: Option<String>,
    pub roles: Vec<Role>,
    pub reset_token: Option<PendingReset>,
    /// First successful login.
    pub authorized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh record with a newly assigned id, no password, no roles.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: None,
            roles: Vec::new(),
            reset_token: None,
            authorized_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set membership over the role list.
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Replace the role set, dropping duplicates.
    pub fn set_roles(&mut self, roles: impl IntoIterator<Item = Role>) {
        self.roles.clear();
        for role in roles {
            if !self.has_role(&role) {
                self.roles.push(role);
            }
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.set_roles(roles);
        self
    }
}
