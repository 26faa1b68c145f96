//! JWT Token Service
//!
//! Issues and verifies the signed, time-bound bearer credential. The token is
//! the whole session: nothing about it is stored server side.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::MIN_SECRET_LEN;
use crate::database::models::Role;

/// JWT Claims structure containing user identity and token metadata
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User unique identifier
    pub sub: Uuid,
    /// Role granted at issuance
    pub role: Role,
    /// Token issued at timestamp
    pub iat: i64,
    /// Token expiration timestamp
    pub exp: i64,
    /// Token issuer
    pub iss: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,
    /// Bad signature, malformed encoding, wrong issuer, or expiry.
    #[error("invalid credential")]
    InvalidCredential,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issued token together with the claim it encodes
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// JWT Service for token operations
#[derive(Clone)]
pub struct CredentialService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: String,
}

impl CredentialService {
    /// Create a new credential service with the provided secret
    pub fn new(secret: &[u8], ttl: Duration, issuer: impl Into<String>) -> Result<Self, CredentialError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CredentialError::WeakSecret);
        }
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        // Expiry is checked in `verify_at` against the same clock used to issue.
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            issuer,
        })
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Generate a token for `subject` with `role`, valid for the configured TTL
    pub fn issue(&self, subject: Uuid, role: Role) -> Result<IssuedToken, CredentialError> {
        self.issue_at(subject, role, Self::now())
    }

    pub(crate) fn issue_at(&self, subject: Uuid, role: Role, issued_at: i64) -> Result<IssuedToken, CredentialError> {
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: subject,
            role,
            iat: issued_at,
            exp: issued_at.saturating_add(ttl_secs),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(CredentialError::Signing)?;
        Ok(IssuedToken { token, claims })
    }

    /// Validate a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        self.verify_at(token, Self::now())
    }

    /// Validate a token as of `now` (unix seconds). The signature comparison
    /// inside `jsonwebtoken` is constant time.
    pub(crate) fn verify_at(&self, token: &str, now: i64) -> Result<Claims, CredentialError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            CredentialError::InvalidCredential
        })?;

        if data.claims.exp <= now {
            tracing::debug!(sub = %data.claims.sub, "Token expired");
            return Err(CredentialError::InvalidCredential);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"an-adequately-long-test-secret-0123456789";

    fn service() -> CredentialService {
        CredentialService::new(SECRET, Duration::from_secs(3600), "storefront-server").unwrap()
    }

    #[test]
    fn test_jwt_roundtrip() {
        let svc = service();
        let user_id = Uuid::new_v4();

        let issued = svc.issue(user_id, Role::Admin).unwrap();
        let claims = svc.verify(&issued.token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "storefront-server");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims, issued.claims);
    }

    #[test]
    fn test_weak_secret_rejected() {
        let result = CredentialService::new(b"short", Duration::from_secs(60), "x");
        assert!(matches!(result, Err(CredentialError::WeakSecret)));
    }

    #[test]
    fn test_any_payload_mutation_invalidates() {
        let svc = service();
        let token = svc.issue(Uuid::new_v4(), Role::Customer).unwrap().token;

        let header_len = token.find('.').unwrap();
        let payload_end = token.rfind('.').unwrap();

        for idx in (header_len + 1)..payload_end {
            let mut bytes = token.clone().into_bytes();
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(
                matches!(svc.verify(&tampered), Err(CredentialError::InvalidCredential)),
                "mutation at byte {idx} was accepted"
            );
        }
    }

    #[test]
    fn test_other_secret_rejected() {
        let other = CredentialService::new(
            b"a-completely-different-secret-abcdefghijkl",
            Duration::from_secs(3600),
            "storefront-server",
        )
        .unwrap();
        let token = other.issue(Uuid::new_v4(), Role::Customer).unwrap().token;

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let issued = svc.issue_at(Uuid::new_v4(), Role::Customer, 1_000_000).unwrap();
        let exp = issued.claims.exp;

        assert!(svc.verify_at(&issued.token, exp - 1).is_ok());
        assert!(svc.verify_at(&issued.token, exp).is_err());
        assert!(svc.verify_at(&issued.token, exp + 1).is_err());
        assert!(svc.verify(&issued.token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let foreign = CredentialService::new(SECRET, Duration::from_secs(3600), "someone-else").unwrap();
        let token = foreign.issue(Uuid::new_v4(), Role::Admin).unwrap().token;

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let svc = service();
        for token in ["", "not-a-token", "a.b.c", "....."] {
            assert!(svc.verify(token).is_err(), "{token:?} accepted");
        }
    }
}
