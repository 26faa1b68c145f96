//! HTTP error type shared by every handler and middleware.
//!
//! All failures leave the server as `{"error": "<message>"}` with a
//! conventional status code. Internal failures never expose their cause to
//! the client; the cause is logged instead.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tower::BoxError;

use crate::services::accounts::AccountError;
use crate::services::catalog::CatalogError;
use crate::services::orders::OrderError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidCredential(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Request timed out")]
    Timeout,
    /// The message is shown to the client, so it must not carry internals.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Log `cause` and produce an opaque 500.
    pub fn internal<E>(cause: E) -> Self
    where
        E: std::error::Error,
    {
        tracing::error!(error = %cause, source = ?cause.source().map(ToString::to_string), "Internal failure");
        Self::Internal(INTERNAL_MESSAGE.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        Self::validation("Invalid request body")
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected path parameter");
        Self::validation("Invalid ID")
    }
}

/// Failures raised by tower middleware rather than by a handler.
impl From<BoxError> for ApiError {
    fn from(err: BoxError) -> Self {
        if err.is::<tower::timeout::error::Elapsed>() {
            return Self::Timeout;
        }
        tracing::error!(error = %err, "Middleware failure");
        Self::Internal(INTERNAL_MESSAGE.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(message) => Self::Validation(message),
            AccountError::EmailTaken => Self::Conflict(err.to_string()),
            AccountError::InvalidCredentials => Self::InvalidCredential("Invalid email or password"),
            AccountError::NotFound => Self::not_found("User not found"),
            other => Self::internal(other),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(message) => Self::Validation(message),
            OrderError::UnknownProduct => Self::validation(err.to_string()),
            OrderError::IdempotencyKeyReused => Self::Conflict(err.to_string()),
            OrderError::NotFound => Self::not_found("Order not found"),
            OrderError::ReadBackFailed { order_id, ref reason } => {
                tracing::error!(%order_id, %reason, "Order committed but read-back failed");
                Self::Internal(format!("Order {order_id} was created but could not be loaded"))
            }
            other => Self::internal(other),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(message) => Self::Validation(message),
            CatalogError::NotFound => Self::not_found("Product not found"),
            CatalogError::Conflict(message) => Self::Conflict(message),
            other => Self::internal(other),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
