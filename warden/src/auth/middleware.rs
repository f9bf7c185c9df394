//! Router middleware: identity resolution and access guards.
//!
//! `resolve_identity` runs on every request and leaves an [`Identity`] in the request
//! extensions. The guards read it from there, resolving it themselves when the layer ordering
//! means it is not present yet.
//!
//! ```ignore
//! Router::new()
//!     .route("/admin/users", post(create_user))
//!     .route_layer(from_fn_with_state(RoleGuard::new(auth.clone(), "admin"), require_role))
//! ```

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::{Extensions, Uri},
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;
use tracing::trace;

use crate::{
    auth::{
        gate::{self, Access},
        identity::Identity,
        service::AuthService,
    },
    types::Role,
};

async fn identity_of(auth: &AuthService, extensions: &Extensions) -> Identity {
    if let Some(identity) = extensions.get::<Identity>() {
        return identity.clone();
    }

    match extensions.get::<Session>().cloned() {
        Some(session) => auth.resolver().resolve(&session).await,
        None => {
            trace!("No session layer in front of guard, treating request as anonymous");
            Identity::Anonymous
        }
    }
}

/// The request URI as the client sent it. Under `Router::nest` the request's own URI has the
/// mount prefix stripped.
fn original_uri(request: &Request) -> &Uri {
    request.extensions().get::<OriginalUri>().map_or(request.uri(), |original| &original.0)
}

/// Resolve the session's identity and store it in the request extensions.
pub async fn resolve_identity(State(auth): State<Arc<AuthService>>, session: Session, mut request: Request, next: Next) -> Response {
    let identity = auth.resolver().resolve(&session).await;
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Reject anonymous requests according to the configured deny policy.
pub async fn require_authenticated(State(auth): State<Arc<AuthService>>, request: Request, next: Next) -> Response {
    let identity = identity_of(&auth, request.extensions()).await;

    match gate::require_authenticated(&identity) {
        Access::Allow => next.run(request).await,
        Access::Deny(denial) => auth.gate().deny(&denial, original_uri(&request)),
    }
}

/// State for [`require_role`]: the service plus the role the route requires.
#[derive(Clone)]
pub struct RoleGuard {
    pub auth: Arc<AuthService>,
    pub role: Role,
}

impl RoleGuard {
    pub fn new(auth: Arc<AuthService>, role: impl Into<Role>) -> Self {
        Self { auth, role: role.into() }
    }
}

/// Reject requests whose user lacks the guard's role.
pub async fn require_role(State(guard): State<RoleGuard>, request: Request, next: Next) -> Response {
    let identity = identity_of(&guard.auth, request.extensions()).await;

    match gate::require_role(&identity, &guard.role) {
        Access::Allow => next.run(request).await,
        Access::Deny(denial) => guard.auth.gate().deny(&denial, original_uri(&request)),
    }
}
