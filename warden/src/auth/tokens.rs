//! Reset/activation tokens.
//!
//! A token is minted as 32 random bytes, handed out once in base64url form, and only its
//! SHA-256 digest is kept on the user record. A user holds at most one pending token;
//! minting a new one replaces the old. Tokens are single use and expire after the
//! configured validity window.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    auth::password::{generate_reset_token, hash_token},
    db::{
        handlers::UserRepository,
        models::users::{PendingReset, User},
    },
    errors::Error,
    types::{UserId, abbrev_uuid},
};

/// A freshly minted token. The value is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct ResetToken {
    pub value: String,
    pub owner: UserId,
    pub issued_at: DateTime<Utc>,
}

impl std::fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetToken")
            .field("value", &"<redacted>")
            .field("owner", &self.owner)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    users: Arc<dyn UserRepository>,
    validity: Duration,
}

impl TokenIssuer {
    pub fn new(users: Arc<dyn UserRepository>, validity: Duration) -> Self {
        Self { users, validity }
    }

    /// Bind a new token to `user` in memory, replacing any pending one. Does not save.
    pub fn mint(&self, user: &mut User) -> ResetToken {
        let value = generate_reset_token();
        let issued_at = Utc::now();
        user.reset_token = Some(PendingReset {
            token_hash: hash_token(&value),
            issued_at,
        });

        ResetToken {
            value,
            owner: user.id,
            issued_at,
        }
    }

    /// Mint a token for `user` and persist it.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)), err)]
    pub async fn issue(&self, user: &mut User) -> Result<ResetToken, Error> {
        let token = self.mint(user);
        self.users.save(user).await?;
        tracing::debug!("Issued reset token");
        Ok(token)
    }

    fn is_expired(&self, pending: &PendingReset, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.validity) {
            Ok(validity) => pending.issued_at + validity <= now,
            // A window too large to represent never elapses
            Err(_) => false,
        }
    }

    /// Validate `presented` against the user's pending token without side effects.
    pub fn check(&self, user: &User, presented: &str) -> Result<(), Error> {
        let pending = user.reset_token.as_ref().ok_or(Error::InvalidToken)?;

        if pending.token_hash != hash_token(presented) {
            return Err(Error::InvalidToken);
        }
        if self.is_expired(pending, Utc::now()) {
            return Err(Error::InvalidToken);
        }

        Ok(())
    }

    /// Validate `presented`, clearing (and saving) the pending token when it has expired so it
    /// cannot be retried. The token stays pending on success.
    pub async fn verify(&self, user: &mut User, presented: &str) -> Result<(), Error> {
        let result = self.check(user, presented);

        if result.is_err()
            && let Some(pending) = &user.reset_token
            && pending.token_hash == hash_token(presented)
            && self.is_expired(pending, Utc::now())
        {
            tracing::debug!(user_id = %abbrev_uuid(&user.id), "Clearing expired reset token");
            user.reset_token = None;
            self.users.save(user).await?;
        }

        result
    }

    /// Validate and clear the pending token.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)), err)]
    pub async fn consume(&self, user: &mut User, presented: &str) -> Result<(), Error> {
        self.verify(user, presented).await?;
        user.reset_token = None;
        self.users.save(user).await?;
        Ok(())
    }
}
