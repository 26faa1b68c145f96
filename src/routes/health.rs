use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{Value, json};

use crate::server::AppState;

/// Liveness endpoint handler.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/`
/// - **Response**: plain text `API is running`
pub async fn root() -> &'static str {
    "API is running"
}

/// Health check endpoint handler.
///
/// Pings the store and reports pool statistics. Used by load balancers and
/// container orchestrators to decide whether to route traffic here.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/api/health`
///
/// # Response Format
/// ```json
/// {
///   "status": "healthy",
///   "message": "Service is healthy",
///   "database": { "size": 3, "idle": 2, "max_size": 25 }
/// }
/// ```
///
/// # HTTP Status Codes
/// - **200 OK**: store reachable
/// - **503 Service Unavailable**: store ping failed, `status` is `degraded`
///
/// # Examples
/// ```bash
/// curl http://localhost:8082/api/health
/// ```
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(db) = state.db.as_ref() else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "message": "Service is healthy", "database": null })),
        );
    };

    match db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "message": "Service is healthy",
                "database": db.stats(),
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "message": "Database is unreachable",
                    "database": db.stats(),
                })),
            )
        }
    }
}
