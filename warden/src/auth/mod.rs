//! Authentication and authorization.
//!
//! Request flow:
//!
//! 1. The tower-sessions layer loads the session from its cookie.
//! 2. [`middleware::resolve_identity`] turns the session's `"userID"` into an
//!    [`identity::Identity`] through the [`identity::IdentityResolver`].
//! 3. Route guards ([`middleware::require_authenticated`], [`middleware::require_role`]) ask
//!    the [`gate`] for a decision and answer denials with the configured deny policy.
//! 4. Handlers take [`current_user::CurrentUser`] or [`identity::Identity`] as extractors.
//!
//! Login checks a password with the [`credentials::CredentialVerifier`]. Account activation and
//! password reset go through single-use tokens from the [`tokens::TokenIssuer`], delivered by
//! [`crate::email::EmailService`]. [`service::AuthService`] composes these flows.
//!
//! # Modules
//!
//! - [`credentials`]: username/password verification
//! - [`current_user`]: request extractors
//! - [`gate`]: access decisions and deny responses
//! - [`identity`]: session to identity resolution
//! - [`middleware`]: router layers
//! - [`password`]: Argon2 hashing and token generation
//! - [`service`]: login, registration and reset flows
//! - [`session`]: typed session access
//! - [`tokens`]: reset/activation token lifecycle

pub mod credentials;
pub mod current_user;
pub mod gate;
pub mod identity;
pub mod middleware;
pub mod password;
pub mod service;
pub mod session;
pub mod tokens;
