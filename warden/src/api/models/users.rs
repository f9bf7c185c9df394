//! API request/response models for users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::users::User;
use crate::types::{Role, UserId};

/// Admin request to provision a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub email: String,
    /// Omit to leave the account pending activation
    #[serde(default)]
    pub password: Option<String>,
    /// Omit to use the configured default roles
    #[serde(default)]
    pub roles: Option<Vec<Role>>,
}

// User response models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
    /// Whether the account has a usable password
    pub activated: bool,
    pub activation_pending: bool,
    pub authorized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            activated: user.password_hash.is_some(),
            activation_pending: user.reset_token.is_some(),
            username: user.username,
            email: user.email,
            roles: user.roles,
            authorized_at: user.authorized_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Response to an admin user creation. The token is only included when it was not mailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreateResponse {
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_token: Option<String>,
}
