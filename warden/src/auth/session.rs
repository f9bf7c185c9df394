//! Typed access to the per-request session.
//!
//! The session store is external (tower-sessions). This module only reads and writes the
//! `"userID"` key, and normalizes the ways an unauthenticated session can look on the way
//! in: an absent key, a JSON `null`, an empty string, the legacy `"NULL"` sentinel, or a
//! value that is not a user id.

use serde_json::Value;
use tower_sessions::Session;

use crate::{
    errors::{Error, Result},
    types::UserId,
};

/// Session key holding the authenticated user's id.
pub const USER_ID_KEY: &str = "userID";

// Written by older clients in place of a missing id.
const NULL_SENTINEL: &str = "NULL";

/// Key/value view of a session.
#[async_trait::async_trait]
pub trait SessionAccessor: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Issue a new session id, keeping the data. Called on privilege change.
    async fn cycle_id(&self) -> Result<()>;

    /// Drop all session data and the session itself.
    async fn clear(&self) -> Result<()>;
}

fn session_error(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::Internal {
        operation: format!("{operation} session: {e}"),
    }
}

#[async_trait::async_trait]
impl SessionAccessor for Session {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Session::get::<Value>(self, key).await.map_err(|e| session_error("read", e))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.insert(key, value).await.map_err(|e| session_error("write", e))
    }

    async fn cycle_id(&self) -> Result<()> {
        Session::cycle_id(self).await.map_err(|e| session_error("cycle", e))
    }

    async fn clear(&self) -> Result<()> {
        self.flush().await.map_err(|e| session_error("flush", e))
    }
}

/// Interpret a stored `"userID"` value.
pub fn parse_user_id(value: &Value) -> Option<UserId> {
    match value {
        Value::String(s) if s.is_empty() || s == NULL_SENTINEL => None,
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The user id bound to the session, if any. Read failures count as unauthenticated.
pub async fn read_user_id(session: &dyn SessionAccessor) -> Option<UserId> {
    match session.get(USER_ID_KEY).await {
        Ok(Some(value)) => {
            let id = parse_user_id(&value);
            if id.is_none() && !value.is_null() {
                tracing::debug!("Ignoring unusable session user id");
            }
            id
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Failed to read session, treating request as anonymous: {}", e);
            None
        }
    }
}

/// Bind the session to a user.
pub async fn write_user_id(session: &dyn SessionAccessor, id: UserId) -> Result<()> {
    session.set(USER_ID_KEY, Value::String(id.to_string())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MapSession;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_null_markers_are_unauthenticated() {
        assert_eq!(parse_user_id(&Value::Null), None);
        assert_eq!(parse_user_id(&json!("")), None);
        assert_eq!(parse_user_id(&json!("NULL")), None);
        assert_eq!(parse_user_id(&json!("not-a-uuid")), None);
        assert_eq!(parse_user_id(&json!(42)), None);
    }

    #[test]
    fn test_valid_id_parses() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(&json!(id.to_string())), Some(id));
    }

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let session = MapSession::default();
        assert_eq!(read_user_id(&session).await, None);

        let id = Uuid::new_v4();
        write_user_id(&session, id).await.unwrap();
        assert_eq!(read_user_id(&session).await, Some(id));
    }

    #[tokio::test]
    async fn test_read_errors_are_unauthenticated() {
        let session = MapSession::failing();
        assert_eq!(read_user_id(&session).await, None);
    }
}
