//! Authentication Middleware
//!
//! Axum middleware for bearer token validation and role checks.
//!
//! A request moves `Unauthenticated -> header present -> token verifies ->
//! Authenticated(AuthUser)`. Any failed step answers 401 and downstream
//! handlers never run. [`AuthMiddleware::require_admin`] is layered inside
//! [`AuthMiddleware::validate_token`] and answers 403 for non-admin callers.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::models::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Authentication middleware that validates bearer tokens and injects the caller
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Middleware function for validating bearer tokens
    pub async fn validate_token(
        State(state): State<AppState>,
        mut req: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        let token = bearer_token(&req)?;

        let claims = state.credentials.verify(token).map_err(|_| {
            tracing::warn!(method = %req.method(), path = %req.uri().path(), "Rejected bearer token");
            ApiError::InvalidCredential("Invalid or expired token")
        })?;

        let auth_user = AuthUser::from(&claims);
        tracing::debug!(user_id = %auth_user.id, role = %auth_user.role, "Caller authenticated");

        // Insert the caller into request extensions for downstream handlers
        req.extensions_mut().insert(auth_user);

        Ok(next.run(req).await)
    }

    /// Middleware function rejecting callers without the admin role
    pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
        let Some(auth_user) = req.extensions().get::<AuthUser>().copied() else {
            return Err(ApiError::InvalidCredential("Unauthorized"));
        };
        if !auth_user.is_admin() {
            tracing::warn!(user_id = %auth_user.id, path = %req.uri().path(), "Admin route refused");
            return Err(ApiError::Forbidden("Admin access required"));
        }
        Ok(next.run(req).await)
    }
}

fn bearer_token(req: &Request) -> Result<&str, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::InvalidCredential("Missing authorization header"))?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::InvalidCredential("Invalid authorization header format"))
}
