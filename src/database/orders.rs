//! PostgreSQL order queries and the order-write transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_postgres::Object;
use rust_decimal::Decimal;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use crate::database::models::{FromRow, NewOrderHeader, NewOrderLine, Order, OrderItem, OrderStatus};
use crate::database::store::{OrderStore, OrderTransaction, PgStore, StoreError, StoreResult};

/// Open transaction on a pooled connection.
///
/// The connection is held in an `Option` so that `commit` and `rollback` can
/// give it back to the pool. If the value is dropped while still holding it
/// (the request future was cancelled), a `ROLLBACK` is spawned before the
/// connection returns to the pool; if that is impossible the connection is
/// detached from the pool and closed instead.
pub struct PgOrderTransaction {
    client: Option<Object>,
}

impl PgOrderTransaction {
    async fn begin(client: Object) -> StoreResult<Self> {
        client.batch_execute("BEGIN").await?;
        Ok(Self { client: Some(client) })
    }

    fn client(&self) -> StoreResult<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("transaction already finished".to_string()))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> StoreResult<()> {
        let result = self.client()?.batch_execute(statement).await;
        match (self.client.take(), result) {
            (Some(_client), Ok(())) => Ok(()),
            (Some(client), Err(err)) => {
                // Transaction state is unknown, so the connection must not be reused.
                drop(Object::take(client));
                Err(err.into())
            }
            (None, result) => result.map_err(StoreError::from),
        }
    }
}

impl Drop for PgOrderTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        tracing::warn!(error = %e, "Rollback of abandoned order transaction failed");
                        drop(Object::take(client));
                    } else {
                        tracing::debug!("Rolled back abandoned order transaction");
                    }
                });
            }
            Err(_) => drop(Object::take(client)),
        }
    }
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn insert_order_header(&mut self, header: &NewOrderHeader) -> StoreResult<Uuid> {
        let row = self
            .client()?
            .query_one(
                "INSERT INTO orders (user_id, status, total_amount, shipping_address, phone_number, idempotency_key)
                 VALUES ($1, 'pending', 0, $2, $3, $4)
                 RETURNING id",
                &[
                    &header.user_id,
                    &header.shipping_address,
                    &header.phone_number,
                    &header.idempotency_key,
                ],
            )
            .await?;
        Ok(row.try_get("id")?)
    }

    async fn insert_order_line(&mut self, order_id: Uuid, line_no: i32, line: &NewOrderLine) -> StoreResult<()> {
        self.client()?
            .execute(
                "INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price)
                 VALUES ($1, $2, $3, $4, $5)",
                &[&order_id, &line_no, &line.product_id, &line.quantity, &line.unit_price],
            )
            .await?;
        Ok(())
    }

    async fn set_order_total(&mut self, order_id: Uuid, total: Decimal) -> StoreResult<()> {
        self.client()?
            .execute(
                "UPDATE orders SET total_amount = $1, updated_at = NOW() WHERE id = $2",
                &[&total, &order_id],
            )
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.finish("ROLLBACK").await
    }
}

/// Attach line items to `orders`, keeping each order's items in line order.
async fn attach_items(client: &Client, mut orders: Vec<Order>) -> StoreResult<Vec<Order>> {
    if orders.is_empty() {
        return Ok(orders);
    }
    let ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
    let rows = client
        .query(
            "SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.unit_price, p.name AS product_name
             FROM order_items oi
             LEFT JOIN products p ON p.id = oi.product_id
             WHERE oi.order_id = ANY($1)
             ORDER BY oi.order_id, oi.line_no",
            &[&ids],
        )
        .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let item = OrderItem::from_row(row)?;
        by_order.entry(item.order_id).or_default().push(item);
    }
    for order in &mut orders {
        order.items = by_order.remove(&order.id).unwrap_or_default();
    }
    Ok(orders)
}

fn orders_from_rows(rows: &[Row]) -> StoreResult<Vec<Order>> {
    rows.iter().map(Order::from_row).collect()
}

async fn single_order(client: &Client, row: Option<Row>) -> StoreResult<Option<Order>> {
    let Some(row) = row else {
        return Ok(None);
    };
    let order = Order::from_row(&row)?;
    Ok(attach_items(client, vec![order]).await?.pop())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>> {
        let client = self.client().await?;
        Ok(Box::new(PgOrderTransaction::begin(client).await?))
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, user_id, status, total_amount, shipping_address, phone_number, created_at, updated_at
                 FROM orders WHERE id = $1",
                &[&id],
            )
            .await?;
        single_order(&client, row).await
    }

    async fn find_order_by_key(&self, user_id: Uuid, key: &str) -> StoreResult<Option<Order>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, user_id, status, total_amount, shipping_address, phone_number, created_at, updated_at
                 FROM orders WHERE user_id = $1 AND idempotency_key = $2",
                &[&user_id, &key],
            )
            .await?;
        single_order(&client, row).await
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, user_id, status, total_amount, shipping_address, phone_number, created_at, updated_at
                 FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
                &[&user_id],
            )
            .await?;
        let orders = orders_from_rows(&rows)?;
        attach_items(&client, orders).await
    }

    async fn list_all_orders(&self) -> StoreResult<Vec<Order>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, user_id, status, total_amount, shipping_address, phone_number, created_at, updated_at
                 FROM orders ORDER BY created_at DESC",
                &[],
            )
            .await?;
        let orders = orders_from_rows(&rows)?;
        attach_items(&client, orders).await
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2
                 RETURNING id, user_id, status, total_amount, shipping_address, phone_number, created_at, updated_at",
                &[&status.as_str(), &id],
            )
            .await?;
        single_order(&client, row).await
    }
}
