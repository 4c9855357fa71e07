//! Credential verification: slow salted password hashing and signed,
//! expiring session tokens. No storage or presence side effects live here;
//! callers own those.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use parley_types::api::Claims;

/// Session tokens expire after 7 days.
pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredential,
    #[error("user not found")]
    UserNotFound,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("username already taken")]
    UsernameTaken,
}

/// Hash a plaintext password with Argon2id and a fresh random salt.
pub fn hash_password(plaintext: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AuthError::InvalidCredential)
}

/// Constant-ish-time verification against a stored hash.
pub fn verify_password(plaintext: &str, stored: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|_| AuthError::InvalidCredential)?;
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredential)
}

/// Signs and verifies session tokens against the server-held secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: String,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a token for `username`, valid for [`TOKEN_TTL_DAYS`].
    pub fn sign(&self, username: &str) -> Result<String, AuthError> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp()
                as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|_| AuthError::TokenInvalid)
    }

    /// Verify signature and expiry, returning the authenticated username.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).is_ok());
        assert_eq!(
            verify_password("hunter23", &hash),
            Err(AuthError::InvalidCredential)
        );
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_round_trip() {
        let signer = TokenSigner::new("test-secret");
        let token = signer.sign("ava").unwrap();
        assert_eq!(signer.verify(&token).unwrap(), "ava");
    }

    #[test]
    fn token_from_wrong_secret_is_invalid() {
        let token = TokenSigner::new("secret-a").sign("ava").unwrap();
        assert_eq!(
            TokenSigner::new("secret-b").verify(&token),
            Err(AuthError::TokenInvalid)
        );
    }

    #[test]
    fn garbage_token_is_invalid() {
        let signer = TokenSigner::new("test-secret");
        assert_eq!(
            signer.verify("not-a-token"),
            Err(AuthError::TokenInvalid)
        );
    }
}
