//! Resolution of a session into a request identity.

use std::sync::Arc;

use tracing::instrument;

use crate::{
    auth::session::{SessionAccessor, read_user_id},
    db::{handlers::UserRepository, models::users::User},
    types::{Role, abbrev_uuid},
};

/// Who is making the request. Recomputed per request, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }

    pub fn into_user(self) -> Option<User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.user().is_some_and(|u| u.has_role(role))
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserRepository>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Resolve the session's identity. Never fails: anything short of a stored user id that
    /// names an existing user resolves to [`Identity::Anonymous`]. The session is not
    /// modified.
    #[instrument(skip_all)]
    pub async fn resolve(&self, session: &dyn SessionAccessor) -> Identity {
        let Some(user_id) = read_user_id(session).await else {
            return Identity::Anonymous;
        };

        match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => {
                tracing::trace!(user_id = %abbrev_uuid(&user.id), "Resolved session identity");
                Identity::Authenticated(user)
            }
            Ok(None) => {
                tracing::debug!(user_id = %abbrev_uuid(&user_id), "Session references unknown user");
                Identity::Anonymous
            }
            Err(e) => {
                tracing::warn!(user_id = %abbrev_uuid(&user_id), "User lookup failed during identity resolution: {}", e);
                Identity::Anonymous
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::session::USER_ID_KEY,
        db::handlers::MemoryUsers,
        test_utils::{MapSession, create_test_user},
    };
    use serde_json::{Value, json};

    async fn setup() -> (IdentityResolver, Arc<MemoryUsers>) {
        let users = Arc::new(MemoryUsers::new());
        (IdentityResolver::new(users.clone()), users)
    }

    #[tokio::test]
    async fn test_absent_key_is_anonymous() {
        let (resolver, _) = setup().await;
        assert_eq!(resolver.resolve(&MapSession::default()).await, Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_null_markers_are_anonymous() {
        let (resolver, _) = setup().await;
        for value in [Value::Null, json!("NULL"), json!("")] {
            let session = MapSession::with(USER_ID_KEY, value);
            assert_eq!(resolver.resolve(&session).await, Identity::Anonymous);
        }
    }

    #[tokio::test]
    async fn test_valid_id_resolves_user() {
        let (resolver, users) = setup().await;
        let user = create_test_user(&*users, "alice", &["editor"]).await;
        let session = MapSession::with(USER_ID_KEY, json!(user.id.to_string()));

        let identity = resolver.resolve(&session).await;
        assert_eq!(identity.user().map(|u| u.id), Some(user.id));
        assert!(identity.has_role(&Role::from("editor")));
    }

    #[tokio::test]
    async fn test_dangling_id_is_anonymous() {
        let (resolver, _) = setup().await;
        let session = MapSession::with(USER_ID_KEY, json!(uuid::Uuid::new_v4().to_string()));
        assert_eq!(resolver.resolve(&session).await, Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_resolution_leaves_session_untouched() {
        let (resolver, users) = setup().await;
        let user = create_test_user(&*users, "alice", &[]).await;
        let session = MapSession::with(USER_ID_KEY, json!(user.id.to_string()));

        resolver.resolve(&session).await;
        resolver.resolve(&session).await;
        assert_eq!(session.snapshot().get(USER_ID_KEY), Some(&json!(user.id.to_string())));
        assert_eq!(session.cycles(), 0);
    }
}
