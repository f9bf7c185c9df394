use axum::{
    Form, Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::{
    AppState,
    api::models::{
        auth::{LoginForm, LoginQuery, MessageResponse, PasswordResetConfirmRequest, PasswordResetRequest, RegisterRequest},
        users::UserResponse,
    },
    auth::{
        credentials::Credentials,
        service::{NewUser, TokenDelivery},
    },
    errors::Error,
    types::abbrev_uuid,
};

/// Log in with a username/password form. Redirects to `callback_url` (local paths only) or `/`.
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LoginQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, Error> {
    let credentials = Credentials {
        username: form.username,
        password: form.password,
    };

    let target = state.auth.login(&session, &credentials, query.callback_url.as_deref()).await?;

    Ok((StatusCode::FOUND, [(header::LOCATION, target)]).into_response())
}

#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Json<MessageResponse>, Error> {
    state.auth.logout(&session).await?;
    Ok(Json(MessageResponse::new("Logout successful")))
}

/// Self-service registration. The activation token is never returned to the caller.
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<(StatusCode, Json<UserResponse>), Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let registration = state
        .auth
        .register(NewUser {
            username: request.username,
            email: request.email,
            password: request.password,
            roles: None,
        })
        .await?;

    if let TokenDelivery::Unsent(_) = registration.delivery {
        tracing::info!(
            user_id = %abbrev_uuid(&registration.user.id),
            "Mail is not configured; activation token was not delivered"
        );
    }

    Ok((StatusCode::CREATED, Json(registration.user.into())))
}

/// Start a password reset. The response does not reveal whether the user exists.
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, Error> {
    match state.auth.request_reset(&request.username).await {
        Ok(()) => {}
        // Mail problems would otherwise reveal that the account exists
        Err(Error::Mail(e)) => tracing::warn!("Failed to send password reset email: {}", e),
        Err(e) => return Err(e),
    }

    Ok(Json(MessageResponse::new(
        "If an account with that username exists, a password reset email has been sent.",
    )))
}

#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>, Error> {
    state.auth.complete_reset(&request.token, &request.new_password).await?;
    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{auth::MessageResponse, users::UserResponse},
        test_utils::{create_test_app, create_test_config, create_test_user_with_password},
    };
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_login_redirects_and_sets_cookie() {
        let (server, state, _) = create_test_app(create_test_config()).await;
        create_test_user_with_password(&*state.users, "alice", "password1").await;

        let response = server
            .post("/login")
            .add_query_param("callback_url", "/users/current")
            .form(&[("username", "alice"), ("password", "password1")])
            .await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(response.header("location"), "/users/current");
        assert!(response.maybe_cookie("warden_session").is_some());
    }

    #[tokio::test]
    async fn test_login_rejects_offsite_callback() {
        let (server, state, _) = create_test_app(create_test_config()).await;
        create_test_user_with_password(&*state.users, "alice", "password1").await;

        let response = server
            .post("/login")
            .add_query_param("callback_url", "https://evil.example.com/")
            .form(&[("username", "alice"), ("password", "password1")])
            .await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(response.header("location"), "/");
    }

    #[tokio::test]
    async fn test_login_rejects_callback_with_control_characters() {
        let (server, state, _) = create_test_app(create_test_config()).await;
        create_test_user_with_password(&*state.users, "alice", "password1").await;

        for callback in ["/\t/evil.example.com", "/\n/x", "/\r/evil.example.com"] {
            let response = server
                .post("/login")
                .add_query_param("callback_url", callback)
                .form(&[("username", "alice"), ("password", "password1")])
                .await;

            response.assert_status(StatusCode::FOUND);
            assert_eq!(response.header("location"), "/", "callback {callback:?}");
        }
    }

    #[tokio::test]
    async fn test_login_failure_is_generic() {
        let (server, state, _) = create_test_app(create_test_config()).await;
        create_test_user_with_password(&*state.users, "alice", "password1").await;

        let wrong = server.post("/login").form(&[("username", "alice"), ("password", "nope")]).await;
        let unknown = server.post("/login").form(&[("username", "mallory"), ("password", "nope")]).await;

        wrong.assert_status(StatusCode::UNAUTHORIZED);
        unknown.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.text(), unknown.text());
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let (mut server, state, _) = create_test_app(create_test_config()).await;
        server.save_cookies();
        create_test_user_with_password(&*state.users, "alice", "password1").await;

        server.post("/login").form(&[("username", "alice"), ("password", "password1")]).await;
        server.get("/users/current").await.assert_status_ok();

        let response = server.post("/logout").await;
        response.assert_status_ok();
        assert_eq!(response.json::<MessageResponse>().message, "Logout successful");

        server.get("/users/current").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_disabled_by_default() {
        let (server, _, _) = create_test_app(create_test_config()).await;

        server
            .post("/register")
            .json(&json!({"username": "alice", "email": "alice@example.com", "password": "password1"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_does_not_return_token() {
        let mut config = create_test_config();
        config.auth.allow_registration = true;
        let (server, _, _) = create_test_app(config).await;

        let response = server
            .post("/register")
            .json(&json!({"username": "alice", "email": "alice@example.com"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body = response.text();
        assert!(!body.contains("token"));
        let user: UserResponse = response.json();
        assert_eq!(user.username, "alice");
        assert!(!user.activated);
        assert!(user.activation_pending);
    }

    #[tokio::test]
    async fn test_register_duplicate_username_conflicts() {
        let mut config = create_test_config();
        config.auth.allow_registration = true;
        let (server, _, _) = create_test_app(config).await;

        let body = json!({"username": "alice", "email": "alice@example.com"});
        server.post("/register").json(&body).await.assert_status(StatusCode::CREATED);

        let body = json!({"username": "alice", "email": "other@example.com"});
        let response = server.post("/register").json(&body).await;
        response.assert_status(StatusCode::CONFLICT);
        response.assert_text("This username is already taken");
    }

    #[tokio::test]
    async fn test_password_reset_requires_mail() {
        let (server, _, _) = create_test_app(create_test_config()).await;

        server
            .post("/password-resets")
            .json(&json!({"username": "alice"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_confirm_with_bad_token() {
        let (server, _, _) = create_test_app(create_test_config()).await;

        let response = server
            .post("/password-resets/confirm")
            .json(&json!({"token": "bogus", "new_password": "password1"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_text("Invalid or expired token");
    }
}
