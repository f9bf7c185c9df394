//! Password hashing, verification and token generation.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;
use sha2::{Digest, Sha256};

use crate::errors::Error;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a password with Argon2id, producing a PHC string.
///
/// Uses the provided parameters or secure defaults if None.
pub fn hash_password_with_params(password: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Hash a password using Argon2 with default secure parameters.
pub fn hash_password(password: &str) -> Result<String, Error> {
    hash_password_with_params(password, None)
}

/// Verify a password against a PHC hash string.
///
/// Verification uses the parameters embedded in the hash itself, and the comparison is
/// constant time. A hash that does not parse is an internal error, not a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    let argon2 = Argon2::default();
    Ok(argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// Generate a secure random token for password reset and account activation
pub fn generate_reset_token() -> String {
    // 32 bytes (256 bits) from the thread-local CSPRNG
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Digest stored in place of a token value.
///
/// Tokens carry 256 bits of entropy, so an unsalted SHA-256 is enough and keeps the
/// digest usable as a lookup key.
pub fn hash_token(token: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Option<Argon2Params> {
        Some(Argon2Params {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password_with_params("test_password_123", cheap()).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("test_password_123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_default_params_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
    }

    #[test]
    fn test_same_input_different_hashes() {
        let hash1 = hash_password_with_params("same_password", cheap()).unwrap();
        let hash2 = hash_password_with_params("same_password", cheap()).unwrap();

        // Salted
        assert_ne!(hash1, hash2);
        assert!(verify_password("same_password", &hash1).unwrap());
        assert!(verify_password("same_password", &hash2).unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        let err = verify_password("anything", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = Argon2Params {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        };
        assert!(hash_password_with_params("pw", Some(params)).is_err());
    }

    #[test]
    fn test_generate_reset_token() {
        let token1 = generate_reset_token();
        let token2 = generate_reset_token();

        assert_ne!(token1, token2);

        // base64url, 43 chars for 32 bytes, no padding
        assert_eq!(token1.len(), 43);
        assert!(token1.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!token1.contains('='));
    }

    #[test]
    fn test_hash_token_is_stable() {
        let token = generate_reset_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_ne!(hash_token(&token), hash_token(&generate_reset_token()));
    }
}
