//! # Storefront Server
//!
//! Commerce back-end built with Rust, Axum, and Tokio: account registration
//! and login with bearer tokens, a product catalog, transactional order
//! creation, and a simulated M-Pesa payment flow, over PostgreSQL.
//!
//! ## Architecture
//! The server is organized into modules:
//! - `server`: router assembly and server lifecycle
//! - `config`: environment variable configuration
//! - `auth`: token service, password hashing, and the auth middleware
//! - `database`: pool, migrations, models, and the store traits
//! - `services`: account, order, and catalog logic
//! - `routes`: HTTP handlers grouped by resource
//!
//! ## Environment Setup
//! `JWT_SECRET` (at least 32 bytes) and either `DATABASE_URL` or the `DB_*`
//! variables are required. A `.env` file in the working directory is loaded
//! if present.
//!
//! ## Running the Server
//! ```bash
//! cargo run
//! ```
//!
//! ## Health Check
//! ```bash
//! curl http://localhost:8082/api/health
//! ```

mod auth;
mod config;
mod database;
mod error;
mod request_log;
mod routes;
mod server;
mod services;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point.
///
/// Loads `.env`, initializes the tracing subscriber, reads configuration,
/// and runs the HTTP server until Ctrl+C or SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may be set directly.
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false) // Don't show module targets for cleaner output
                .compact(),
        )
        .init();

    tracing::info!("🏁 Starting storefront server...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "🏗️  Build profile: {}",
        if cfg!(debug_assertions) { "debug" } else { "release" }
    );

    let config = config::Config::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    server::start(config).await
}
