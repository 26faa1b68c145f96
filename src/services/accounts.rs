//! Account Service
//!
//! Registration, login and user administration. Password hashing is
//! delegated to [`crate::auth::password`] and token issuance to the
//! [`CredentialService`].

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::auth::jwt::{CredentialError, CredentialService, IssuedToken};
use crate::auth::password::{self, PasswordError};
use crate::database::models::{NewUser, Role, User, UserChanges};
use crate::database::store::{StoreError, UserStore, constraints};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error("User with this email already exists")]
    EmailTaken,
    /// Unknown email, wrong password and disabled account all end here.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// A user together with a freshly issued token
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: IssuedToken,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    credentials: Arc<CredentialService>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, credentials: Arc<CredentialService>) -> Self {
        Self { users, credentials }
    }

    /// Create a customer account and sign the new user in.
    pub async fn register(&self, email: &str, password: String, full_name: &str) -> Result<Session, AccountError> {
        let email = normalize_email(email);
        let full_name = full_name.trim();

        if email.is_empty() || password.is_empty() || full_name.is_empty() {
            return Err(AccountError::Validation(
                "Email, password, and full name are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AccountError::Validation("Invalid email format".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }

        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let password_hash = password::hash_password(password).await?;
        let user = self
            .users
            .insert_user(NewUser {
                email,
                password_hash,
                full_name: full_name.to_string(),
                role: Role::Customer,
            })
            .await
            .map_err(|e| {
                // Lost a race with a concurrent registration.
                if e.is_unique_violation(constraints::USERS_EMAIL) {
                    AccountError::EmailTaken
                } else {
                    AccountError::Store(e)
                }
            })?;

        let token = self.credentials.issue(user.id, user.role)?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(Session { user, token })
    }

    /// Verify credentials and issue a token.
    pub async fn login(&self, email: &str, password: String) -> Result<Session, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AccountError::Validation("Email and password are required".to_string()));
        }

        let Some(user) = self.users.find_user_by_email(&email).await? else {
            password::verify_against_dummy(password).await?;
            return Err(AccountError::InvalidCredentials);
        };

        let matches = password::verify_password(password, user.password_hash.clone()).await?;
        if !matches || user.disabled {
            tracing::info!(user_id = %user.id, "Login rejected");
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.credentials.issue(user.id, user.role)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(Session { user, token })
    }

    /// Profile of an authenticated caller. Disabled accounts are not found.
    pub async fn profile(&self, user_id: Uuid) -> Result<User, AccountError> {
        match self.users.find_user(user_id).await? {
            Some(user) if !user.disabled => Ok(user),
            _ => Err(AccountError::NotFound),
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AccountError> {
        Ok(self.users.list_users().await?)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AccountError> {
        self.users.find_user(user_id).await?.ok_or(AccountError::NotFound)
    }

    pub async fn update_user(&self, user_id: Uuid, mut changes: UserChanges) -> Result<User, AccountError> {
        if let Some(full_name) = changes.full_name.take() {
            let full_name = full_name.trim().to_string();
            if full_name.is_empty() {
                return Err(AccountError::Validation("Full name cannot be empty".to_string()));
            }
            changes.full_name = Some(full_name);
        }
        if changes.is_empty() {
            return Err(AccountError::Validation("No fields to update".to_string()));
        }

        let user = self
            .users
            .update_user(user_id, &changes)
            .await?
            .ok_or(AccountError::NotFound)?;
        tracing::info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    /// Soft delete: the account is disabled, not removed.
    pub async fn disable_user(&self, user_id: Uuid) -> Result<(), AccountError> {
        let changes = UserChanges {
            disabled: Some(true),
            ..UserChanges::default()
        };
        self.users
            .update_user(user_id, &changes)
            .await?
            .ok_or(AccountError::NotFound)?;
        tracing::info!(%user_id, "User disabled");
        Ok(())
    }
}
