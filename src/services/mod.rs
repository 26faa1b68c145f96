//! # Services Module
//!
//! Business logic for accounts, orders and the catalog. Services are written
//! against the store traits in [`crate::database::store`].

pub mod accounts;
pub mod catalog;
pub mod orders;

pub use accounts::AccountService;
pub use catalog::CatalogService;
pub use orders::OrderManager;
