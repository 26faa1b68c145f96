//! Order routes

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::models::AuthUser;
use crate::database::models::{NewOrderLine, Order, OrderStatus};
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::services::orders::{CreateOrder, OrderOutcome};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<NewOrderLine>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

fn idempotency_key(headers: &HeaderMap) -> ApiResult<Option<String>> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value
                .to_str()
                .map(|key| key.trim().to_string())
                .map_err(|_| ApiError::validation("Idempotency-Key must be visible ASCII"))
        })
        .transpose()
}

/// `POST /api/orders`
///
/// 201 with the new order, or 200 with the existing one when the
/// `Idempotency-Key` header matches an earlier order of the caller.
pub async fn create_order(
    State(state): State<AppState>,
    caller: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let Json(payload) = payload?;
    let request = CreateOrder {
        items: payload.items,
        shipping_address: payload.shipping_address,
        phone_number: payload.phone_number,
        idempotency_key: idempotency_key(&headers)?,
    };

    match state.orders.create_order(caller.id, request).await? {
        OrderOutcome::Created(order) => Ok((StatusCode::CREATED, Json(order))),
        OrderOutcome::Replayed(order) => Ok((StatusCode::OK, Json(order))),
    }
}

/// `GET /api/orders`
pub async fn list_my_orders(State(state): State<AppState>, caller: AuthUser) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.orders.list_for_user(caller.id).await?))
}

/// `GET /api/orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    caller: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Order>> {
    let Path(id) = id?;
    Ok(Json(state.orders.get_order(&caller, id).await?))
}

/// `GET /api/admin/orders`
pub async fn list_all_orders(State(state): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.orders.list_all().await?))
}

/// `PUT /api/admin/orders/{id}/status`
pub async fn update_order_status(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Json<Order>> {
    let Path(id) = id?;
    let Json(payload) = payload?;

    let raw = payload
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Status is required"))?;
    let status: OrderStatus = raw.trim().parse().map_err(|_| {
        let allowed: Vec<&str> = OrderStatus::ALL.iter().map(OrderStatus::as_str).collect();
        ApiError::validation(format!("Status must be one of: {}", allowed.join(", ")))
    })?;

    Ok(Json(state.orders.update_status(id, status).await?))
}
