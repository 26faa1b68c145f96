//! # Server Module
//!
//! HTTP server setup and route configuration for the storefront server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tower::{BoxError, ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::jwt::CredentialService;
use crate::auth::middleware::AuthMiddleware;
use crate::config::{Config, HttpConfig};
use crate::database::connection::DatabaseConnection;
use crate::database::migrations::run_migrations;
use crate::database::store::{OrderStore, PgStore, ProductStore, UserStore};
use crate::error::ApiError;
use crate::request_log::log_request_body;
use crate::routes::{auth, health, orders, payments, products, users};
use crate::services::{AccountService, CatalogService, OrderManager};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialService>,
    pub accounts: AccountService,
    pub orders: OrderManager,
    pub catalog: CatalogService,
    /// Absent when running on a non-PostgreSQL store.
    pub db: Option<DatabaseConnection>,
    pub upload_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new<S>(
        credentials: Arc<CredentialService>,
        store: Arc<S>,
        db: Option<DatabaseConnection>,
        upload_path: PathBuf,
    ) -> Self
    where
        S: UserStore + ProductStore + OrderStore + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let products: Arc<dyn ProductStore> = store.clone();
        let orders: Arc<dyn OrderStore> = store;

        Self {
            accounts: AccountService::new(users, credentials.clone()),
            orders: OrderManager::new(orders),
            catalog: CatalogService::new(products),
            credentials,
            db,
            upload_path: Arc::new(upload_path),
        }
    }
}

fn cors_layer(http: &HttpConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = http
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static(orders::IDEMPOTENCY_KEY_HEADER),
        ])
        .allow_credentials(true)
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    ApiError::from(err)
}

/// Build the application router.
///
/// Routes fall in three groups: public, authenticated (bearer token), and
/// admin (bearer token with the admin role). The groups are merged, so one
/// path can be public for `GET` and admin-only for `PUT`.
pub fn build_router(state: AppState, http: &HttpConfig) -> Router {
    let public_routes = Router::new()
        .route("/", get(health::root))
        .route("/api/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/products", get(products::list_products))
        .route("/api/products/{id}", get(products::get_product))
        .route("/api/mpesa/webhook", post(payments::webhook));

    let authenticated_routes = Router::new()
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/orders", post(orders::create_order).get(orders::list_my_orders))
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/mpesa/stkpush", post(payments::stk_push))
        .route("/api/mpesa/transaction/{id}", get(payments::transaction_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), AuthMiddleware::validate_token));

    // require_admin runs after validate_token has identified the caller
    let admin_routes = Router::new()
        .route("/api/admin/orders", get(orders::list_all_orders))
        .route("/api/admin/orders/{id}/status", put(orders::update_order_status))
        .route("/api/admin/users", get(users::list_users))
        .route(
            "/api/admin/users/{id}",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/api/products", post(products::create_product))
        .route(
            "/api/products/{id}",
            put(products::update_product).delete(products::delete_product),
        )
        .route("/api/products/{id}/image", post(products::upload_product_image))
        .route_layer(middleware::from_fn(AuthMiddleware::require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), AuthMiddleware::validate_token));

    let mut app = Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        .nest_service("/uploads", ServeDir::new(state.upload_path.as_path()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    if http.log_request_bodies {
        tracing::warn!("Request body logging is enabled; sensitive fields are redacted");
        app = app.layer(middleware::from_fn(log_request_body));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(http.request_timeout))
            .layer(cors_layer(http)),
    )
    .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("🛑 Shutdown signal received, draining connections");
}

/// Starts the storefront HTTP server.
///
/// Connects the pool, applies migrations, wires the services onto the
/// PostgreSQL store, and serves until Ctrl+C or SIGTERM.
pub async fn start(config: Config) -> Result<()> {
    let credentials = Arc::new(
        CredentialService::new(
            config.auth.jwt_secret.as_bytes(),
            config.auth.token_ttl,
            config.auth.issuer.clone(),
        )
        .context("Failed to initialise credential service")?,
    );

    let db = DatabaseConnection::new(config.database.clone()).await?;
    if config.server.run_migrations {
        run_migrations(db.pool()).await?;
    }
    db.spawn_reaper(REAPER_INTERVAL);

    let store = Arc::new(PgStore::new(db.clone()));
    let state = AppState::new(
        credentials,
        store,
        Some(db),
        PathBuf::from(&config.http.upload_path),
    );
    let app = build_router(state, &config.http);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr} - port may already be in use"))?;

    tracing::info!("🚀 Storefront server starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/api/health", addr);
    tracing::info!("🔧 Environment: {}", config.server.env);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("👋 Server stopped");
    Ok(())
}
