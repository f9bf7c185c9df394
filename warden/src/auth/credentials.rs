//! Username/password verification at login.

use std::sync::Arc;

use tracing::instrument;

use crate::{
    auth::password::{self, Argon2Params},
    db::{handlers::UserRepository, models::users::User},
    errors::Error,
    types::abbrev_uuid,
};

/// Submitted login form.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialVerifier {
    users: Arc<dyn UserRepository>,
    /// Hash of a random secret, verified against when there is no stored hash so that unknown
    /// usernames cost the same Argon2 work as known ones.
    decoy_hash: Option<Arc<str>>,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserRepository>, params: Argon2Params) -> Self {
        let decoy_hash = match password::hash_password_with_params(&password::generate_reset_token(), Some(params)) {
            Ok(hash) => Some(Arc::from(hash)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare decoy password hash, login timing may reveal unknown usernames");
                None
            }
        };

        Self { users, decoy_hash }
    }

    /// Check a username/password pair against the stored hash.
    ///
    /// Unknown user, an account without a password and a wrong password all fail with the
    /// same [`Error::InvalidCredentials`], after the same amount of hashing work. No session or
    /// redirect side effects.
    #[instrument(skip_all)]
    pub async fn verify(&self, credentials: &Credentials) -> Result<User, Error> {
        let user = self.users.find_by_username(&credentials.username).await?;
        let stored_hash = user.as_ref().and_then(|u| u.password_hash.as_deref()).map(Arc::<str>::from);

        let is_valid = match stored_hash.clone().or_else(|| self.decoy_hash.clone()) {
            Some(hash) => check_blocking(&credentials.password, hash).await?,
            None => false,
        };

        let Some(user) = user else {
            tracing::debug!("Login attempt for unknown username");
            return Err(Error::InvalidCredentials);
        };

        if stored_hash.is_none() {
            tracing::debug!(user_id = %abbrev_uuid(&user.id), "Login attempt on account without password");
            return Err(Error::InvalidCredentials);
        }

        if !is_valid {
            tracing::debug!(user_id = %abbrev_uuid(&user.id), "Password mismatch");
            return Err(Error::InvalidCredentials);
        }

        Ok(user)
    }
}

// Argon2 is CPU-bound; keep it off the async workers
async fn check_blocking(candidate: &str, hash: Arc<str>) -> Result<bool, Error> {
    let candidate = candidate.to_string();
    tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}
