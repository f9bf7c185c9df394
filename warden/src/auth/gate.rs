//! Access control decisions and the deny path.
//!
//! Deciding ([`require_authenticated`], [`require_role`]) is kept apart from responding
//! ([`AccessGate::deny`]) so the decision can be tested without a request.

use axum::{
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::{auth::identity::Identity, types::Role};

/// Body of a hard-deny response.
pub const NOT_AUTHORIZED: &str = "Not Authorized";

/// What to do with a request that fails an access check. Fixed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyPolicy {
    /// Respond 401 `Not Authorized`.
    #[default]
    HardDeny,
    /// Redirect to the login route, carrying the original path as `callback_url`.
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    MissingRole(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(Denial),
}

pub fn require_authenticated(identity: &Identity) -> Access {
    if identity.is_authenticated() {
        Access::Allow
    } else {
        Access::Deny(Denial::Unauthenticated)
    }
}

/// Exact, case-sensitive membership. Roles have no hierarchy.
pub fn require_role(identity: &Identity, role: &Role) -> Access {
    match identity.user() {
        None => Access::Deny(Denial::Unauthenticated),
        Some(user) if user.has_role(role) => Access::Allow,
        Some(_) => Access::Deny(Denial::MissingRole(role.clone())),
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    policy: DenyPolicy,
    login_route: String,
}

impl AccessGate {
    pub fn new(policy: DenyPolicy, login_route: impl Into<String>) -> Self {
        Self {
            policy,
            login_route: login_route.into(),
        }
    }

    /// Build the response for a denied request. Both denial kinds follow the same policy.
    pub fn deny(&self, denial: &Denial, uri: &Uri) -> Response {
        match denial {
            Denial::Unauthenticated => tracing::debug!(path = %uri.path(), "Denied anonymous request"),
            Denial::MissingRole(role) => tracing::debug!(path = %uri.path(), %role, "Denied request lacking role"),
        }

        match self.policy {
            DenyPolicy::HardDeny => (StatusCode::UNAUTHORIZED, NOT_AUTHORIZED).into_response(),
            DenyPolicy::Redirect => {
                let location = self.login_redirect(uri);
                (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response()
            }
        }
    }

    /// Login route with the original path (and query) as `callback_url`.
    pub fn login_redirect(&self, uri: &Uri) -> String {
        let callback = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or_else(|| uri.path());
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("callback_url", callback)
            .finish();
        let separator = if self.login_route.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.login_route, separator, query)
    }
}
