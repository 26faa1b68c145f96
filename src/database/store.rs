//! Store traits consumed by the services.
//!
//! [`PgStore`] implements them over the deadpool pool. Tests use an
//! in-memory implementation with fault injection.

use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::database::connection::DatabaseConnection;
use crate::database::models::{
    NewOrderHeader, NewOrderLine, NewProduct, NewUser, Order, OrderStatus, Product, ProductChanges,
    ProductFilter, User, UserChanges,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },
    #[error("foreign key constraint {constraint} violated")]
    ForeignKeyViolation { constraint: String },
    #[error("database error: {0}")]
    Database(#[source] tokio_postgres::Error),
    #[error("failed to decode row: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            if *db_err.code() == SqlState::UNIQUE_VIOLATION {
                return StoreError::UniqueViolation { constraint };
            }
            if *db_err.code() == SqlState::FOREIGN_KEY_VIOLATION {
                return StoreError::ForeignKeyViolation { constraint };
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Unique constraint names shared by the stores and the services.
pub mod constraints {
    pub const USERS_EMAIL: &str = "users_email_key";
    pub const PRODUCTS_NAME: &str = "products_name_key";
    pub const ORDERS_IDEMPOTENCY_KEY: &str = "orders_user_idempotency_key";
    pub const ORDER_ITEMS_PRODUCT: &str = "order_items_product_id_fkey";
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Non-disabled users, newest first.
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn update_user(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Active products matching `filter`, and the total count of matches.
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)>;
    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn insert_product(&self, product: &NewProduct) -> StoreResult<Product>;
    async fn update_product(&self, id: Uuid, changes: &ProductChanges) -> StoreResult<Option<Product>>;
    /// Returns `false` when no such product exists.
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;
}

/// One open store transaction for writing a single order.
///
/// Nothing written through it is visible to other readers until
/// [`OrderTransaction::commit`] succeeds. Dropping it without committing
/// rolls back.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Insert the header with status `pending` and a zero total, returning its id.
    async fn insert_order_header(&mut self, header: &NewOrderHeader) -> StoreResult<Uuid>;
    async fn insert_order_line(&mut self, order_id: Uuid, line_no: i32, line: &NewOrderLine) -> StoreResult<()>;
    async fn set_order_total(&mut self, order_id: Uuid, total: rust_decimal::Decimal) -> StoreResult<()>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>>;
    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn find_order_by_key(&self, user_id: Uuid, key: &str) -> StoreResult<Option<Order>>;
    /// Orders of one user, newest first, items attached.
    async fn list_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    /// Every order, newest first, items attached.
    async fn list_all_orders(&self) -> StoreResult<Vec<Order>>;
    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>>;
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pub(crate) db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub(crate) async fn client(&self) -> StoreResult<deadpool_postgres::Object> {
        Ok(self.db.pool().get().await?)
    }
}
