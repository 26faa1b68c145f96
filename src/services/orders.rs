//! Order Transaction Manager
//!
//! Materializes an order and its line items all-or-nothing. The header is
//! written with a zero total, each line is inserted while the total is
//! accumulated, then the header total is set and the transaction committed.
//! Any failure before commit rolls back every row. The order is then read
//! back outside the transaction to build the response; a failure there does
//! not undo the commit.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::models::AuthUser;
use crate::database::models::{NewOrderHeader, NewOrderLine, Order, OrderStatus};
use crate::database::store::{OrderStore, OrderTransaction, StoreError, constraints};

pub const MAX_ITEMS: usize = 100;
pub const MAX_QUANTITY: i32 = 10_000;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),
    #[error("Unknown product in order")]
    UnknownProduct,
    #[error("failed to start order transaction: {0}")]
    TransactionStartFailed(#[source] StoreError),
    #[error("failed to write order: {0}")]
    WriteFailed(#[source] StoreError),
    #[error("failed to commit order: {0}")]
    CommitFailed(#[source] StoreError),
    /// The order is committed; only building the response failed.
    #[error("order {order_id} committed but could not be read back: {reason}")]
    ReadBackFailed { order_id: Uuid, reason: String },
    #[error("Idempotency-Key was already used for a different order")]
    IdempotencyKeyReused,
    #[error("Order not found")]
    NotFound,
    #[error("failed to read orders: {0}")]
    ReadFailed(#[source] StoreError),
}

/// Order creation request, as received from the client.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub items: Vec<NewOrderLine>,
    pub shipping_address: String,
    pub phone_number: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug)]
pub enum OrderOutcome {
    Created(Order),
    /// An order with the same idempotency key already existed.
    Replayed(Order),
}

impl OrderOutcome {
    pub fn into_order(self) -> Order {
        match self {
            OrderOutcome::Created(order) | OrderOutcome::Replayed(order) => order,
        }
    }
}

/// Reasons a write attempt did not commit.
enum WriteAbort {
    DuplicateKey,
    UnknownProduct,
    Store(StoreError),
}

impl From<StoreError> for WriteAbort {
    fn from(err: StoreError) -> Self {
        match err {
            e if e.is_unique_violation(constraints::ORDERS_IDEMPOTENCY_KEY) => WriteAbort::DuplicateKey,
            StoreError::ForeignKeyViolation { ref constraint } if constraint == constraints::ORDER_ITEMS_PRODUCT => {
                WriteAbort::UnknownProduct
            }
            other => WriteAbort::Store(other),
        }
    }
}

fn validate(request: &CreateOrder) -> Result<(), OrderError> {
    let invalid = |message: &str| -> Result<(), OrderError> { Err(OrderError::Validation(message.to_string())) };

    if request.items.is_empty() {
        return invalid("Order must have at least one item");
    }
    if request.items.len() > MAX_ITEMS {
        return Err(OrderError::Validation(format!(
            "Order cannot have more than {MAX_ITEMS} items"
        )));
    }
    let max_price = Decimal::from(10_000_000_000i64);
    for line in &request.items {
        if line.quantity <= 0 || line.quantity > MAX_QUANTITY {
            return Err(OrderError::Validation(format!(
                "Quantity must be between 1 and {MAX_QUANTITY}"
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return invalid("Unit price cannot be negative");
        }
        if line.unit_price.normalize().scale() > 2 || line.unit_price >= max_price {
            return invalid("Unit price must be a valid amount with at most 2 decimal places");
        }
    }
    if let Some(key) = &request.idempotency_key {
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(OrderError::Validation(format!(
                "Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// A stored order answers a retry only if it carries the same lines.
fn replay(existing: Order, lines: &[NewOrderLine]) -> Result<OrderOutcome, OrderError> {
    let same_lines = existing.items.len() == lines.len()
        && existing.items.iter().zip(lines).all(|(item, line)| {
            item.product_id == line.product_id && item.quantity == line.quantity && item.unit_price == line.unit_price
        });
    if !same_lines {
        tracing::warn!(order_id = %existing.id, "Idempotency-Key reused with different lines");
        return Err(OrderError::IdempotencyKeyReused);
    }
    Ok(OrderOutcome::Replayed(existing))
}

/// Steps 2 to 4 inside an open transaction. Returns the new id and its total.
async fn write_order(
    tx: &mut dyn OrderTransaction,
    header: &NewOrderHeader,
    lines: &[NewOrderLine],
) -> Result<(Uuid, Decimal), StoreError> {
    let order_id = tx.insert_order_header(header).await?;

    let mut running_total = Decimal::ZERO;
    for (line_no, line) in (1i32..).zip(lines) {
        tx.insert_order_line(order_id, line_no, line).await?;
        running_total += line.line_total();
    }

    tx.set_order_total(order_id, running_total).await?;
    Ok((order_id, running_total))
}

#[derive(Clone)]
pub struct OrderManager {
    store: Arc<dyn OrderStore>,
}

impl OrderManager {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Create an order for `user_id`, or return the order previously created
    /// with the same idempotency key.
    pub async fn create_order(&self, user_id: Uuid, request: CreateOrder) -> Result<OrderOutcome, OrderError> {
        validate(&request)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self.find_by_key(user_id, key).await? {
                tracing::info!(order_id = %existing.id, %user_id, "Replaying order for idempotency key");
                return replay(existing, &request.items);
            }
        }

        let header = NewOrderHeader {
            user_id,
            shipping_address: request.shipping_address.trim().to_string(),
            phone_number: request.phone_number.trim().to_string(),
            idempotency_key: request.idempotency_key.clone(),
        };

        let mut tx = self.store.begin().await.map_err(OrderError::TransactionStartFailed)?;

        let written = write_order(tx.as_mut(), &header, &request.items).await;
        let (order_id, total) = match written {
            Ok(written) => written,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed order write also failed");
                }
                return match WriteAbort::from(err) {
                    WriteAbort::DuplicateKey => self.replay_after_race(user_id, &header, &request.items).await,
                    WriteAbort::UnknownProduct => Err(OrderError::UnknownProduct),
                    WriteAbort::Store(err) => {
                        tracing::error!(error = %err, %user_id, "Order write failed, rolled back");
                        Err(OrderError::WriteFailed(err))
                    }
                };
            }
        };

        if let Err(err) = tx.commit().await {
            return match WriteAbort::from(err) {
                WriteAbort::DuplicateKey => self.replay_after_race(user_id, &header, &request.items).await,
                WriteAbort::UnknownProduct => Err(OrderError::UnknownProduct),
                WriteAbort::Store(err) => Err(OrderError::CommitFailed(err)),
            };
        }

        tracing::info!(
            %order_id,
            %user_id,
            %total,
            items = request.items.len(),
            "Order created"
        );

        match self.store.find_order(order_id).await {
            Ok(Some(order)) => Ok(OrderOutcome::Created(order)),
            Ok(None) => Err(OrderError::ReadBackFailed {
                order_id,
                reason: "order row not found after commit".to_string(),
            }),
            Err(err) => Err(OrderError::ReadBackFailed {
                order_id,
                reason: err.to_string(),
            }),
        }
    }

    async fn find_by_key(&self, user_id: Uuid, key: &str) -> Result<Option<Order>, OrderError> {
        self.store
            .find_order_by_key(user_id, key)
            .await
            .map_err(OrderError::ReadFailed)
    }

    /// A concurrent request with the same key committed first.
    async fn replay_after_race(
        &self,
        user_id: Uuid,
        header: &NewOrderHeader,
        lines: &[NewOrderLine],
    ) -> Result<OrderOutcome, OrderError> {
        let key = header.idempotency_key.as_deref().unwrap_or_default();
        match self.find_by_key(user_id, key).await? {
            Some(existing) => {
                tracing::info!(order_id = %existing.id, %user_id, "Concurrent request won the idempotency key");
                replay(existing, lines)
            }
            None => Err(OrderError::WriteFailed(StoreError::UniqueViolation {
                constraint: constraints::ORDERS_IDEMPOTENCY_KEY.to_string(),
            })),
        }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, OrderError> {
        self.store
            .list_orders_for_user(user_id)
            .await
            .map_err(OrderError::ReadFailed)
    }

    pub async fn list_all(&self) -> Result<Vec<Order>, OrderError> {
        self.store.list_all_orders().await.map_err(OrderError::ReadFailed)
    }

    /// Visible to its owner and to admins. Anyone else gets `NotFound`, so
    /// order ids of other users cannot be probed.
    pub async fn get_order(&self, caller: &AuthUser, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self
            .store
            .find_order(order_id)
            .await
            .map_err(OrderError::ReadFailed)?
            .ok_or(OrderError::NotFound)?;

        if order.user_id != caller.id && !caller.is_admin() {
            return Err(OrderError::NotFound);
        }
        Ok(order)
    }

    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, OrderError> {
        let order = self
            .store
            .update_order_status(order_id, status)
            .await
            .map_err(OrderError::ReadFailed)?
            .ok_or(OrderError::NotFound)?;
        tracing::info!(%order_id, status = %status, "Order status updated");
        Ok(order)
    }
}
