//! Auth routes for registration, login, and profile

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::auth::models::{AuthResponse, AuthUser, LoginRequest, ProfileResponse, RegisterRequest};
use crate::error::ApiResult;
use crate::server::AppState;
use crate::services::accounts::Session;

fn auth_response(message: &'static str, session: Session) -> AuthResponse {
    AuthResponse {
        message,
        expires_at: session.token.claims.exp,
        token: session.token.token,
        user: session.user,
    }
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let Json(payload) = payload?;
    let session = state
        .accounts
        .register(&payload.email, payload.password, &payload.full_name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(auth_response("User registered successfully", session)),
    ))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let session = state.accounts.login(&payload.email, payload.password).await?;
    Ok(Json(auth_response("Login successful", session)))
}

/// `GET /api/auth/profile`
pub async fn profile(State(state): State<AppState>, caller: AuthUser) -> ApiResult<Json<ProfileResponse>> {
    let user = state.accounts.profile(caller.id).await?;
    Ok(Json(ProfileResponse { user }))
}
