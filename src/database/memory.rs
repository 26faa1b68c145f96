//! In-memory store for tests.
//!
//! Mirrors the constraints of the PostgreSQL schema that the services rely
//! on (unique email, unique product name, unique idempotency key per user,
//! the line item product foreign key) and stages order writes until commit.
//! [`Faults`] injects failures at chosen points.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::models::{
    NewOrderHeader, NewOrderLine, NewProduct, NewUser, Order, OrderItem, OrderStatus, Product, ProductChanges,
    ProductFilter, User, UserChanges,
};
use crate::database::store::{
    OrderStore, OrderTransaction, ProductStore, StoreError, StoreResult, UserStore, constraints,
};

#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail the N-th line item insert of every transaction (1-based).
    pub fail_line_at: Option<usize>,
    /// Fail `find_order`, which is what order read-back uses.
    pub fail_read_back: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    /// Before the header insert, commit a competing order with the same
    /// idempotency key and these lines.
    pub race_at_header: Option<Vec<NewOrderLine>>,
    /// Right before commit, commit a competing copy of every keyed order.
    pub race_at_commit: bool,
}

#[derive(Debug, Clone)]
struct StoredOrder {
    order: Order,
    idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredItem {
    item: OrderItem,
    line_no: i32,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    products: Vec<Product>,
    orders: Vec<StoredOrder>,
    items: Vec<StoredItem>,
}

impl Tables {
    fn key_taken(&self, user_id: Uuid, key: Option<&str>) -> bool {
        key.is_some_and(|key| {
            self.orders
                .iter()
                .any(|o| o.order.user_id == user_id && o.idempotency_key.as_deref() == Some(key))
        })
    }

    /// Commit an order the way a concurrent request would have.
    fn commit_competitor(&mut self, user_id: Uuid, key: &str, lines: &[NewOrderLine]) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.orders.push(StoredOrder {
            order: Order {
                id,
                user_id,
                status: OrderStatus::Pending,
                total_amount: lines.iter().map(NewOrderLine::line_total).sum(),
                shipping_address: String::new(),
                phone_number: String::new(),
                created_at: now,
                updated_at: now,
                items: Vec::new(),
            },
            idempotency_key: Some(key.to_string()),
        });
        for (line_no, line) in (1i32..).zip(lines) {
            self.items.push(StoredItem {
                item: OrderItem {
                    id: Uuid::new_v4(),
                    order_id: id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    product_name: None,
                },
                line_no,
            });
        }
        id
    }

    fn materialize(&self, stored: &StoredOrder) -> Order {
        let mut items: Vec<&StoredItem> = self
            .items
            .iter()
            .filter(|i| i.item.order_id == stored.order.id)
            .collect();
        items.sort_by_key(|i| i.line_no);

        let mut order = stored.order.clone();
        order.items = items
            .into_iter()
            .map(|i| {
                let mut item = i.item.clone();
                item.product_name = self
                    .products
                    .iter()
                    .find(|p| p.id == item.product_id)
                    .map(|p| p.name.clone());
                item
            })
            .collect();
        order
    }

    /// Orders matching `keep`, newest first.
    fn orders_where(&self, keep: impl Fn(&Order) -> bool) -> Vec<Order> {
        self.orders
            .iter()
            .rev()
            .filter(|o| keep(&o.order))
            .map(|o| self.materialize(o))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock() = faults;
    }

    pub fn seed_product(&self, name: &str, price: Decimal) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            price,
            stock: 10,
            category: "Sneakers".to_string(),
            image_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().products.push(product.clone());
        product
    }

    pub fn order_count(&self) -> usize {
        self.tables.lock().orders.len()
    }

    pub fn item_count(&self) -> usize {
        self.tables.lock().items.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::USERS_EMAIL.to_string(),
            });
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role: user.role,
            disabled: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self
            .tables
            .lock()
            .users
            .iter()
            .rev()
            .filter(|u| !u.disabled)
            .cloned()
            .collect())
    }

    async fn update_user(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.lock();
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(full_name) = &changes.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(disabled) = changes.disabled {
            user.disabled = disabled;
        }
        if !changes.is_empty() {
            user.updated_at = Utc::now();
        }
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)> {
        let tables = self.tables.lock();
        let matching: Vec<&Product> = tables
            .products
            .iter()
            .rev()
            .filter(|p| p.is_active)
            .filter(|p| filter.category.as_ref().is_none_or(|c| &p.category == c))
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.tables.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_product(&self, product: &NewProduct) -> StoreResult<Product> {
        let mut tables = self.tables.lock();
        if tables.products.iter().any(|p| p.name == product.name) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::PRODUCTS_NAME.to_string(),
            });
        }
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            stock: product.stock,
            category: product.category.clone(),
            image_url: product.image_url.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.products.push(product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, changes: &ProductChanges) -> StoreResult<Option<Product>> {
        let mut tables = self.tables.lock();
        if let Some(name) = &changes.name {
            if tables.products.iter().any(|p| p.id != id && &p.name == name) {
                return Err(StoreError::UniqueViolation {
                    constraint: constraints::PRODUCTS_NAME.to_string(),
                });
            }
        }
        let Some(product) = tables.products.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            product.name = name.clone();
        }
        if let Some(description) = &changes.description {
            product.description = description.clone();
        }
        if let Some(price) = changes.price {
            product.price = price;
        }
        if let Some(stock) = changes.stock {
            product.stock = stock;
        }
        if let Some(category) = &changes.category {
            product.category = category.clone();
        }
        if let Some(image_url) = &changes.image_url {
            product.image_url = Some(image_url.clone());
        }
        if let Some(is_active) = changes.is_active {
            product.is_active = is_active;
        }
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        if tables.items.iter().any(|i| i.item.product_id == id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: constraints::ORDER_ITEMS_PRODUCT.to_string(),
            });
        }
        let before = tables.products.len();
        tables.products.retain(|p| p.id != id);
        Ok(tables.products.len() < before)
    }
}

/// Writes staged in the transaction and applied to the tables on commit.
struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    faults: Faults,
    orders: Vec<StoredOrder>,
    items: Vec<StoredItem>,
    lines_written: usize,
}

impl MemoryTransaction {
    fn staged_order(&mut self, order_id: Uuid) -> StoreResult<&mut StoredOrder> {
        self.orders
            .iter_mut()
            .find(|o| o.order.id == order_id)
            .ok_or_else(|| StoreError::Decode(format!("order {order_id} not written in this transaction")))
    }
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn insert_order_header(&mut self, header: &NewOrderHeader) -> StoreResult<Uuid> {
        let key = header.idempotency_key.as_deref();
        {
            let mut tables = self.tables.lock();
            if let (Some(lines), Some(key)) = (self.faults.race_at_header.take(), key) {
                tables.commit_competitor(header.user_id, key, &lines);
            }
            if tables.key_taken(header.user_id, key) {
                return Err(StoreError::UniqueViolation {
                    constraint: constraints::ORDERS_IDEMPOTENCY_KEY.to_string(),
                });
            }
        }
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: header.user_id,
            status: OrderStatus::Pending,
            total_amount: Decimal::ZERO,
            shipping_address: header.shipping_address.clone(),
            phone_number: header.phone_number.clone(),
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };
        let id = order.id;
        self.orders.push(StoredOrder {
            order,
            idempotency_key: header.idempotency_key.clone(),
        });
        Ok(id)
    }

    async fn insert_order_line(&mut self, order_id: Uuid, line_no: i32, line: &NewOrderLine) -> StoreResult<()> {
        self.lines_written += 1;
        if self.faults.fail_line_at == Some(self.lines_written) {
            return Err(StoreError::Unavailable(format!("injected fault at line {line_no}")));
        }
        if !self.tables.lock().products.iter().any(|p| p.id == line.product_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: constraints::ORDER_ITEMS_PRODUCT.to_string(),
            });
        }
        self.staged_order(order_id)?;
        self.items.push(StoredItem {
            item: OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                product_name: None,
            },
            line_no,
        });
        Ok(())
    }

    async fn set_order_total(&mut self, order_id: Uuid, total: Decimal) -> StoreResult<()> {
        self.staged_order(order_id)?.order.total_amount = total;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            tables,
            faults,
            orders,
            items,
            ..
        } = *self;
        if faults.fail_commit {
            return Err(StoreError::Unavailable("injected commit fault".to_string()));
        }
        let mut tables = tables.lock();
        if faults.race_at_commit {
            for staged in &orders {
                let Some(key) = staged.idempotency_key.as_deref() else {
                    continue;
                };
                let lines: Vec<NewOrderLine> = items
                    .iter()
                    .filter(|i| i.item.order_id == staged.order.id)
                    .map(|i| NewOrderLine {
                        product_id: i.item.product_id,
                        quantity: i.item.quantity,
                        unit_price: i.item.unit_price,
                    })
                    .collect();
                tables.commit_competitor(staged.order.user_id, key, &lines);
            }
        }
        for staged in &orders {
            if tables.key_taken(staged.order.user_id, staged.idempotency_key.as_deref()) {
                return Err(StoreError::UniqueViolation {
                    constraint: constraints::ORDERS_IDEMPOTENCY_KEY.to_string(),
                });
            }
        }
        tables.orders.extend(orders);
        tables.items.extend(items);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>> {
        let faults = self.faults.lock().clone();
        if faults.fail_begin {
            return Err(StoreError::Unavailable("injected begin fault".to_string()));
        }
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            faults,
            orders: Vec::new(),
            items: Vec::new(),
            lines_written: 0,
        }))
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        if self.faults.lock().fail_read_back {
            return Err(StoreError::Unavailable("injected read fault".to_string()));
        }
        let tables = self.tables.lock();
        Ok(tables
            .orders
            .iter()
            .find(|o| o.order.id == id)
            .map(|o| tables.materialize(o)))
    }

    async fn find_order_by_key(&self, user_id: Uuid, key: &str) -> StoreResult<Option<Order>> {
        let tables = self.tables.lock();
        Ok(tables
            .orders
            .iter()
            .find(|o| o.order.user_id == user_id && o.idempotency_key.as_deref() == Some(key))
            .map(|o| tables.materialize(o)))
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        Ok(self.tables.lock().orders_where(|o| o.user_id == user_id))
    }

    async fn list_all_orders(&self) -> StoreResult<Vec<Order>> {
        Ok(self.tables.lock().orders_where(|_| true))
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>> {
        let mut tables = self.tables.lock();
        let Some(stored) = tables.orders.iter_mut().find(|o| o.order.id == id) else {
            return Ok(None);
        };
        stored.order.status = status;
        stored.order.updated_at = Utc::now();
        let stored = stored.clone();
        Ok(Some(tables.materialize(&stored)))
    }
}
