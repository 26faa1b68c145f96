//! Argon2 password hashing.
//!
//! Hashing is CPU bound, so both operations run on the blocking pool and only
//! hold up the request that asked for them.

use argon2::password_hash::rand_core::OsRng;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("password task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Hash compared against when the account does not exist, so that unknown
/// emails and wrong passwords take the same time to reject.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_blocking("storefront-dummy-password").ok());

fn hash_blocking(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

fn verify_blocking(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::MalformedHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Produce a PHC-format argon2 hash of `password`
pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_blocking(&password)).await?
}

/// Check `password` against a stored PHC hash
pub async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_blocking(&password, &hash)).await?
}

/// Burn the same work as a real verification and report a mismatch.
pub async fn verify_against_dummy(password: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = verify_blocking(&password, hash);
        }
        false
    })
    .await
    .map_err(PasswordError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("password1".to_string()).await.unwrap();

        assert!(!hash.contains("password1"));
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("password1".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("password2".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let a = hash_password("same-password".to_string()).await.unwrap();
        let b = hash_password("same-password".to_string()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash() {
        let result = verify_password("x".to_string(), "plaintext".to_string()).await;
        assert!(matches!(result, Err(PasswordError::MalformedHash)));
    }

    #[tokio::test]
    async fn test_dummy_never_matches() {
        assert!(!verify_against_dummy("storefront-dummy-password".to_string()).await.unwrap());
    }
}
