//! # warden: session-backed authentication and role-based access control
//!
//! `warden` is a request-scoped authentication and authorization layer for axum services. It
//! resolves each request's session into a user identity, verifies credentials at login,
//! enforces role-based access control on protected routes, and runs a token-based account
//! activation / password reset flow delivered by email.
//!
//! ## Request Flow
//!
//! Every request passes through three layers before reaching a handler:
//!
//! 1. **Sessions** ([tower-sessions](https://docs.rs/tower-sessions)): loads the session named by
//!    the session cookie.
//! 2. **Tracing** ([`tower_http::trace::TraceLayer`]): one span per request.
//! 3. **Identity resolution** ([`auth::middleware::resolve_identity`]): reads the session's
//!    `"userID"`, loads the user from the [`db::handlers::UserRepository`], and stores an
//!    [`auth::identity::Identity`] in the request extensions.
//!
//! Protected routes add a guard: [`auth::middleware::require_authenticated`] or
//! [`auth::middleware::require_role`]. A denied request never reaches its handler; it gets a
//! `401 Not Authorized` or a redirect to the login route, depending on `auth.deny_policy`.
//!
//! ## Accounts and Tokens
//!
//! Accounts are created by self-registration (when `auth.allow_registration` is set) or by an
//! admin. A new account carries a single-use activation token; with mail configured the token
//! is sent through [`email::EmailService`], otherwise an admin receives it in the API response.
//! The same token mechanism drives password resets. Only a SHA-256 digest of each token is
//! stored, and passwords are stored as Argon2id hashes.
//!
//! ## Storage
//!
//! Users live in PostgreSQL ([`db::handlers::PgUsers`]) or, for development, in memory
//! ([`db::handlers::MemoryUsers`]). Sessions use the tower-sessions in-memory store.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML format and environment overrides. The configuration is
//! validated and frozen at startup.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::{Level, debug, info};

use crate::{
    api::handlers::{auth as auth_handlers, users},
    auth::{
        middleware::{RoleGuard, require_authenticated, require_role, resolve_identity},
        service::AuthService,
    },
    config::DatabaseConfig,
    db::handlers::{MemoryUsers, PgUsers, UserRepository},
    email::EmailService,
};

pub use config::Config;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .auth(auth)
///     .users(users)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub auth: Arc<AuthService>,
    pub users: Arc<dyn UserRepository>,
}

impl AppState {
    /// Wire the auth service over `users`, with `mailer` when mail is configured.
    pub fn new(config: Config, users: Arc<dyn UserRepository>, mailer: Option<EmailService>) -> Self {
        let auth = Arc::new(AuthService::new(users.clone(), config.auth.clone(), mailer));
        AppState::builder().config(config).auth(auth).users(users).build()
    }
}

/// Open the configured user datastore, creating its schema when missing.
///
/// Returns the pool alongside the repository for PostgreSQL so it can be closed on shutdown.
pub async fn setup_repository(config: &DatabaseConfig) -> anyhow::Result<(Arc<dyn UserRepository>, Option<PgPool>)> {
    let (users, pool): (Arc<dyn UserRepository>, Option<PgPool>) = match config {
        DatabaseConfig::Memory => {
            info!("Using in-memory user store; users are lost on restart");
            (Arc::new(MemoryUsers::new()), None)
        }
        DatabaseConfig::Postgres { url, max_connections } => {
            let pool = PgPoolOptions::new().max_connections(*max_connections).connect(url).await?;
            (Arc::new(PgUsers::new(pool.clone())), Some(pool))
        }
    };

    if !users.table_exists().await? {
        info!("Users table not found, creating schema");
        users.ensure_schema().await?;
    }

    Ok((users, pool))
}

/// Create or promote the configured initial admin user.
pub async fn provision_admin(state: &AppState) -> anyhow::Result<()> {
    let (Some(username), Some(email)) = (&state.config.admin_username, &state.config.admin_email) else {
        debug!("No initial admin configured");
        return Ok(());
    };

    state
        .auth
        .ensure_admin(username, email, state.config.admin_password.as_deref())
        .await?;
    Ok(())
}

fn session_layer(config: &Config) -> anyhow::Result<SessionManagerLayer<MemoryStore>> {
    let session = &config.auth.session;
    let timeout = time::Duration::try_from(session.timeout)?;

    Ok(SessionManagerLayer::new(MemoryStore::default())
        .with_name(session.cookie_name.clone())
        .with_secure(session.cookie_secure)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(timeout)))
}

/// Build the router with all routes, guards and layers.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth = state.auth.clone();

    let admin_routes = Router::new()
        .route("/admin/users", post(users::create_user))
        .route("/admin/users/{id}", get(users::get_user))
        .route_layer(from_fn_with_state(
            RoleGuard::new(auth.clone(), state.config.auth.admin_role.clone()),
            require_role,
        ));

    let user_routes = Router::new()
        .route("/users/current", get(users::get_current_user))
        .route_layer(from_fn_with_state(auth.clone(), require_authenticated));

    let public_routes = Router::new()
        .route("/login", post(auth_handlers::login))
        .route("/logout", post(auth_handlers::logout))
        .route("/register", post(auth_handlers::register))
        .route("/password-resets", post(auth_handlers::request_password_reset))
        .route("/password-resets/confirm", post(auth_handlers::confirm_password_reset));

    let router = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(from_fn_with_state(auth, resolve_identity))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(session_layer(&state.config)?)
        .with_state(state);

    Ok(router)
}

pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!(bind_address = %config.bind_address(), "Starting warden");

        let database = config.database.clone().ok_or_else(|| errors::Error::Configuration {
            message: "no user datastore configured".to_string(),
        })?;
        let (users, pool) = setup_repository(&database).await?;

        let mailer = match &config.email {
            Some(email) => Some(EmailService::from_config(email)?),
            None => {
                info!("Email is not configured; password reset is disabled");
                None
            }
        };

        let app_state = AppState::new(config.clone(), users, mailer);
        provision_admin(&app_state).await?;

        let router = build_router(app_state.clone())?;

        Ok(Self {
            router,
            app_state,
            config,
            pool,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("warden listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}
