use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use crate::{auth::identity::Identity, db::models::users::User, errors::Error};

/// Reads the identity left by the `resolve_identity` middleware. Routes outside that layer
/// see [`Identity::Anonymous`].
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

/// The authenticated user, or a 401 [`Error::Unauthenticated`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(identity) = Identity::from_request_parts(parts, state).await;
        identity.into_user().map(CurrentUser).ok_or(Error::Unauthenticated { message: None })
    }
}
