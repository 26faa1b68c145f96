//! Opt-in request body logging.
//!
//! Installed only when `REQUEST_LOG_BODIES=true`. JSON bodies are logged with
//! every value under a sensitive key replaced by `"[REDACTED]"`. Other bodies
//! are logged by length only, and bodies larger than [`MAX_LOGGED_BODY`] or of
//! unknown length are passed through without being buffered.

use axum::{
    body::Body,
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::error::ApiError;

pub const MAX_LOGGED_BODY: usize = 64 * 1024;

const SENSITIVE_KEYS: [&str; 5] = ["password", "token", "secret", "authorization", "password_hash"];
const REDACTED: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|sensitive| key.contains(sensitive))
}

/// Replace every value under a sensitive key, at any depth.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_sensitive(key) {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    redact(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn declared_len(req: &Request) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Middleware logging redacted request bodies
pub async fn log_request_body(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let len = match declared_len(&req) {
        Some(len) if len > 0 => len,
        _ => return next.run(req).await,
    };

    if !is_json(&req) || len > MAX_LOGGED_BODY {
        tracing::info!(%method, %path, body_len = len, "Request body");
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to buffer request body");
            return ApiError::validation("Invalid request body").into_response();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(mut value) => {
            redact(&mut value);
            tracing::info!(%method, %path, body = %value, "Request body");
        }
        Err(_) => tracing::info!(%method, %path, body_len = bytes.len(), "Request body (not valid JSON)"),
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_nested_secrets() {
        let mut body = json!({
            "email": "a@b.com",
            "password": "password1",
            "profile": { "api_token": "abc", "name": "A" },
            "history": [{ "Password_Hash": "$argon2id$..." }]
        });
        redact(&mut body);

        assert_eq!(body["email"], "a@b.com");
        assert_eq!(body["password"], REDACTED);
        assert_eq!(body["profile"]["api_token"], REDACTED);
        assert_eq!(body["profile"]["name"], "A");
        assert_eq!(body["history"][0]["Password_Hash"], REDACTED);
    }

    #[test]
    fn test_redacts_whole_subtree() {
        let mut body = json!({ "secret": { "nested": "value" } });
        redact(&mut body);
        assert_eq!(body, json!({ "secret": REDACTED }));
    }

    #[tokio::test]
    async fn test_body_reaches_handler_unchanged() {
        use axum::{Router, middleware, routing::post};
        use tower::ServiceExt;

        async fn echo(body: String) -> String {
            body
        }

        let app = Router::new()
            .route("/echo", post(echo))
            .layer(middleware::from_fn(log_request_body));

        let payload = r#"{"email":"a@b.com","password":"password1"}"#;
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], payload.as_bytes());
    }
}
