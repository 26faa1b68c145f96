//! Simulated M-Pesa endpoints.
//!
//! Nothing here talks to a payment provider or touches the store; responses
//! are fabricated so that clients can exercise a checkout flow.

use axum::{
    Json,
    extract::{
        Path,
        rejection::{JsonRejection, PathRejection},
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::models::AuthUser;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct StkPushRequest {
    pub order_id: Option<Uuid>,
    pub amount: Decimal,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct StkPushResponse {
    pub transaction_id: Uuid,
    pub mpesa_ref: String,
    pub status: &'static str,
    pub amount: Decimal,
    /// Number the push was sent to; absent on status lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn mpesa_ref(transaction_id: &Uuid) -> String {
    let simple = transaction_id.simple().to_string();
    format!("MPESA{}", &simple[..8])
}

/// `POST /api/mpesa/stkpush`
pub async fn stk_push(
    caller: AuthUser,
    payload: Result<Json<StkPushRequest>, JsonRejection>,
) -> ApiResult<Json<StkPushResponse>> {
    let Json(payload) = payload?;
    let transaction_id = Uuid::new_v4();
    tracing::info!(
        user_id = %caller.id,
        order_id = ?payload.order_id,
        %transaction_id,
        "Simulated STK push"
    );
    Ok(Json(StkPushResponse {
        transaction_id,
        mpesa_ref: mpesa_ref(&transaction_id),
        status: "pending",
        amount: payload.amount,
        phone: Some(payload.phone.trim().to_string()).filter(|phone| !phone.is_empty()),
        created_at: Utc::now(),
    }))
}

/// `GET /api/mpesa/transaction/{id}`
pub async fn transaction_status(
    _caller: AuthUser,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<StkPushResponse>> {
    let Path(id) = id?;
    let transaction_id =
        Uuid::parse_str(&id).map_err(|_| ApiError::validation("Invalid transaction ID"))?;
    Ok(Json(StkPushResponse {
        transaction_id,
        mpesa_ref: mpesa_ref(&transaction_id),
        status: "success",
        amount: Decimal::from(100),
        phone: None,
        created_at: Utc::now(),
    }))
}

/// `POST /api/mpesa/webhook`
pub async fn webhook() -> Json<Value> {
    Json(json!({ "message": "Webhook received (simulated)" }))
}
