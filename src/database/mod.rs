//! # Database Module
//!
//! PostgreSQL integration using tokio-postgres with a deadpool pool.
//! Includes connection management, models, migrations and the store traits
//! the services are written against.

pub mod connection;
pub mod migrations;
pub mod models;
pub mod orders;
pub mod products;
pub mod query;
pub mod store;
pub mod users;

#[cfg(test)]
pub mod memory;
