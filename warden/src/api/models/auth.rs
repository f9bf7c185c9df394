//! API request/response models for authentication.

use serde::{Deserialize, Serialize};

/// Login form body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Login query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginQuery {
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
