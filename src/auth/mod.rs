//! # Authentication Module
//!
//! Handles JWT token issuance and validation, password hashing, and the
//! middleware that secures API endpoints.

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
