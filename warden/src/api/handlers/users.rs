use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::users::{UserCreate, UserCreateResponse, UserResponse},
    auth::{
        current_user::CurrentUser,
        service::{NewUser, TokenDelivery},
    },
    errors::Error,
    types::UserId,
};

/// The logged-in user
#[tracing::instrument(skip_all)]
pub async fn get_current_user(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

/// Provision a user. The activation token is returned only when it could not be mailed.
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserCreateResponse>), Error> {
    let registration = state
        .auth
        .register(NewUser {
            username: request.username,
            email: request.email,
            password: request.password,
            roles: request.roles,
        })
        .await?;

    let activation_token = match registration.delivery {
        TokenDelivery::Mailed => None,
        TokenDelivery::Unsent(token) => Some(token.value),
    };

    Ok((
        StatusCode::CREATED,
        Json(UserCreateResponse {
            user: registration.user.into(),
            activation_token,
        }),
    ))
}

#[tracing::instrument(skip_all)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<UserResponse>, Error> {
    let user = state.users.find_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(user.into()))
}
