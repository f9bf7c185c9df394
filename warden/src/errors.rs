use crate::db::errors::DbError;
use crate::email::MailError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// The message shown for every failed login, whatever the reason.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Bad username or password at login. Never says which one.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Reset/activation token expired, absent, or mismatched
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// User datastore error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Notification rendering or transport failure
    #[error(transparent)]
    Mail(#[from] MailError),

    /// Missing or invalid startup dependency
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::InvalidToken => StatusCode::BAD_REQUEST,
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Mail(_) => StatusCode::BAD_GATEWAY,
            Error::Configuration { .. } | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
            Error::InvalidToken => "Invalid or expired token".to_string(),
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => match constraint.as_deref() {
                    Some(c) if c.contains("email") => "An account with this email address already exists".to_string(),
                    Some(c) if c.contains("username") => "This username is already taken".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Mail(_) => "The notification email could not be sent".to_string(),
            Error::Configuration { .. } | Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Configuration { .. } | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Mail(_) => {
                tracing::warn!("Notification error: {}", self);
            }
            Error::InvalidCredentials | Error::InvalidToken | Error::Unauthenticated { .. } => {
                tracing::info!("Authentication error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
