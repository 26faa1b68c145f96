// # Routes Module
//
// HTTP route handlers, one submodule per resource. Routers are assembled
// and secured in `server.rs`.

/// Liveness and health check endpoints
pub mod health;

/// Registration, login, and profile
pub mod auth;

/// Order creation, listing, and admin status updates
pub mod orders;

/// Product catalog and image uploads
pub mod products;

/// User administration
pub mod users;

/// Simulated M-Pesa payments
pub mod payments;
