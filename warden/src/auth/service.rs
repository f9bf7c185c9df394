//! Login, registration and password reset flows.
//!
//! [`AuthService`] composes the identity resolver, credential verifier, token issuer, access
//! gate and (optionally) the email service. It is built once at startup from the immutable
//! [`AuthConfig`] and shared through the application state.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::{
    auth::{
        credentials::{CredentialVerifier, Credentials},
        gate::AccessGate,
        identity::IdentityResolver,
        password::{self, hash_token},
        session::{SessionAccessor, write_user_id},
        tokens::{ResetToken, TokenIssuer},
    },
    config::AuthConfig,
    db::{handlers::UserRepository, models::users::User},
    email::EmailService,
    errors::Error,
    types::{Role, abbrev_uuid},
};

/// Input to [`AuthService::register`].
#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    /// `None` or empty leaves the account pending activation through the token.
    pub password: Option<String>,
    /// Overrides the configured default roles.
    pub roles: Option<Vec<Role>>,
}

/// How the activation token left the service.
#[derive(Debug)]
pub enum TokenDelivery {
    Mailed,
    /// Mail is not configured; the caller is responsible for handing the token over.
    Unsent(ResetToken),
}

#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub delivery: TokenDelivery,
}

/// Keep redirects on this site: only local absolute paths are accepted.
///
/// Browsers drop tabs and newlines from URLs, so `"/\t/host"` would be followed as `//host`.
/// Any control or whitespace character rejects the target.
pub fn redirect_target(callback_url: Option<&str>) -> String {
    match callback_url {
        Some(url) if is_local_path(url) => url.to_string(),
        _ => "/".to_string(),
    }
}

fn is_local_path(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.contains('\\')
        && !url.chars().any(|c| c.is_control() || c.is_whitespace())
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    resolver: IdentityResolver,
    verifier: CredentialVerifier,
    tokens: TokenIssuer,
    gate: AccessGate,
    mailer: Option<EmailService>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, config: AuthConfig, mailer: Option<EmailService>) -> Self {
        Self {
            resolver: IdentityResolver::new(users.clone()),
            verifier: CredentialVerifier::new(users.clone(), config.password.argon2_params()),
            tokens: TokenIssuer::new(users.clone(), config.reset_token_validity),
            gate: AccessGate::new(config.deny_policy, config.login_route.clone()),
            users,
            mailer,
            config,
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn validate_password(&self, password: &str) -> Result<(), Error> {
        let policy = &self.config.password;
        let length = password.chars().count();
        if length < policy.min_length {
            return Err(Error::BadRequest {
                message: format!("Password must be at least {} characters", policy.min_length),
            });
        }
        if length > policy.max_length {
            return Err(Error::BadRequest {
                message: format!("Password must be at most {} characters", policy.max_length),
            });
        }
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String, Error> {
        let password = password.to_string();
        let params = self.config.password.argon2_params();
        tokio::task::spawn_blocking(move || password::hash_password_with_params(&password, Some(params)))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password hashing task: {e}"),
            })?
    }

    /// Verify credentials and bind the session to the user. Returns where to redirect.
    #[instrument(skip_all, err)]
    pub async fn login(
        &self,
        session: &dyn SessionAccessor,
        credentials: &Credentials,
        callback_url: Option<&str>,
    ) -> Result<String, Error> {
        let mut user = self.verifier.verify(credentials).await?;

        // New id on privilege change
        session.cycle_id().await?;
        write_user_id(session, user.id).await?;

        if user.authorized_at.is_none() {
            user.authorized_at = Some(Utc::now());
            if let Err(e) = self.users.save(&user).await {
                tracing::warn!(user_id = %abbrev_uuid(&user.id), "Failed to record first login: {}", e);
            }
        }

        tracing::info!(user_id = %abbrev_uuid(&user.id), "User logged in");
        Ok(redirect_target(callback_url))
    }

    #[instrument(skip_all, err)]
    pub async fn logout(&self, session: &dyn SessionAccessor) -> Result<(), Error> {
        session.clear().await
    }

    /// Create a user with a pending activation token.
    ///
    /// The user and token are saved together. When mail is configured the token is sent; a
    /// send failure is returned as [`Error::Mail`] and the saved user is kept.
    #[instrument(skip_all, fields(username = %new_user.username), err)]
    pub async fn register(&self, new_user: NewUser) -> Result<Registration, Error> {
        let username = new_user.username.trim();
        let email = new_user.email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(Error::BadRequest {
                message: "Username and email are required".to_string(),
            });
        }

        let mut user = User::new(username, email);
        user.set_roles(new_user.roles.unwrap_or_else(|| self.config.default_user_roles.clone()));

        if let Some(password) = new_user.password.filter(|p| !p.is_empty()) {
            self.validate_password(&password)?;
            user.password_hash = Some(self.hash_password(&password).await?);
        }

        let token = self.tokens.mint(&mut user);
        self.users.save(&user).await?;
        tracing::info!(user_id = %abbrev_uuid(&user.id), "Registered user");

        let delivery = match &self.mailer {
            Some(mailer) => {
                mailer.notify(&user, &token).await?;
                TokenDelivery::Mailed
            }
            None => TokenDelivery::Unsent(token),
        };

        Ok(Registration { user, delivery })
    }

    /// Issue and mail a reset token. Unknown usernames succeed without doing anything.
    #[instrument(skip_all, err)]
    pub async fn request_reset(&self, username: &str) -> Result<(), Error> {
        let mailer = self.mailer.as_ref().ok_or_else(|| Error::BadRequest {
            message: "Password reset is not available".to_string(),
        })?;

        let Some(mut user) = self.users.find_by_username(username).await? else {
            tracing::debug!("Password reset requested for unknown user");
            return Ok(());
        };

        let token = self.tokens.issue(&mut user).await?;
        mailer.notify(&user, &token).await?;
        Ok(())
    }

    /// Set a new password using a reset token. Password and token clearing land in one save.
    #[instrument(skip_all, err)]
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<User, Error> {
        self.validate_password(new_password)?;

        let mut user = self
            .users
            .find_by_reset_token(&hash_token(token))
            .await?
            .ok_or(Error::InvalidToken)?;

        self.tokens.verify(&mut user, token).await?;

        user.password_hash = Some(self.hash_password(new_password).await?);
        user.reset_token = None;
        self.users.save(&user).await?;

        tracing::info!(user_id = %abbrev_uuid(&user.id), "Password reset completed");
        Ok(user)
    }

    /// Make sure the initial admin exists and holds the admin role.
    ///
    /// An existing user is only given the role; its password is left alone. A new admin
    /// without a configured password gets an activation token, mailed when possible.
    #[instrument(skip(self, email, password), err)]
    pub async fn ensure_admin(&self, username: &str, email: &str, password: Option<&str>) -> Result<User, Error> {
        let admin_role = self.config.admin_role.clone();

        if let Some(mut user) = self.users.find_by_username(username).await? {
            if !user.has_role(&admin_role) {
                user.roles.push(admin_role);
                self.users.save(&user).await?;
                tracing::info!(user_id = %abbrev_uuid(&user.id), "Granted admin role to existing user");
            }
            return Ok(user);
        }

        let mut user = User::new(username, email).with_roles([admin_role]);
        match password {
            Some(password) => {
                user.password_hash = Some(self.hash_password(password).await?);
                self.users.save(&user).await?;
            }
            None => {
                let token = self.tokens.issue(&mut user).await?;
                match &self.mailer {
                    Some(mailer) => {
                        if let Err(e) = mailer.notify(&user, &token).await {
                            tracing::warn!("Failed to mail admin activation token: {}", e);
                        }
                    }
                    None => tracing::warn!("Admin account created without a password and mail is not configured"),
                }
            }
        }

        tracing::info!(user_id = %abbrev_uuid(&user.id), "Created initial admin user");
        Ok(user)
    }
}
