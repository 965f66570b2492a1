// =============================================================================
// VENDOR SERVICE - Main Entry Point
// =============================================================================
// Vendor management service.
//
// WHAT THIS SERVICE DOES:
// - Stores vendors and their purchase orders (CRUD over REST)
// - Recomputes each vendor's performance metrics whenever one of its
//   purchase orders is saved, and serves them on demand
// - Keeps an append-only history of metric snapshots
// - Requires a bearer JWT on every resource route
// - Exposes Prometheus metrics and health probes
// =============================================================================

mod auth;
mod cache;
mod config;
mod db;
mod error;
mod handlers;
#[cfg(test)]
mod memory;
mod metrics;
mod models;
mod performance;
mod store;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::TokenValidator;
use crate::cache::VendorCache;
use crate::config::Config;
use crate::db::Database;
use crate::metrics::setup_metrics;
use crate::store::Repository;

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
/// Shared state handed to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Persistence port (PostgreSQL in production)
    pub store: Arc<dyn Repository>,

    /// Vendor read cache; `None` when REDIS_URL is unset
    pub cache: Option<VendorCache>,

    /// Bearer token verification
    pub tokens: TokenValidator,

    /// Used to render metrics in Prometheus format
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

// -----------------------------------------------------------------------------
// ROUTES
// -----------------------------------------------------------------------------
/// Build the full application router.
///
/// Resource routes sit behind the bearer-token gate; probes and `/metrics`
/// do not.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // ----- Vendors -----
        .route(
            "/vendors/",
            get(handlers::list_vendors).post(handlers::create_vendor),
        )
        .route(
            "/vendors/:id/",
            get(handlers::get_vendor)
                .put(handlers::replace_vendor)
                .patch(handlers::patch_vendor)
                .delete(handlers::delete_vendor),
        )
        .route(
            "/vendors/:id/performance/",
            get(handlers::vendor_performance),
        )
        .route(
            "/vendors/:id/performance/history/",
            get(handlers::vendor_performance_history),
        )
        // ----- Purchase orders -----
        .route(
            "/purchase_orders/",
            get(handlers::list_purchase_orders).post(handlers::create_purchase_order),
        )
        .route(
            "/purchase_orders/:id/",
            get(handlers::get_purchase_order)
                .put(handlers::replace_purchase_order)
                .patch(handlers::patch_purchase_order)
                .delete(handlers::delete_purchase_order),
        )
        .route(
            "/purchase_orders/:id/acknowledge/",
            post(handlers::acknowledge_purchase_order),
        )
        // Only runs for matched routes, so unknown paths stay 404
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(api)
        .layer(middleware::from_fn(metrics::track_http))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -----------------------------------------------------------------------------
// MAIN FUNCTION
// -----------------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    // RUST_LOG controls levels, e.g. RUST_LOG=info,vendor_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vendor_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Vendor Service...");

    let config = Config::from_env()?;
    info!(
        port = config.port,
        cache_enabled = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    info!("Connected to PostgreSQL");

    db.run_migrations().await?;
    info!("Database migrations completed");

    let cache = match &config.redis_url {
        Some(url) => {
            let cache = VendorCache::connect(url, config.cache_ttl_seconds).await?;
            info!(ttl_seconds = config.cache_ttl_seconds, "Connected to Redis");
            Some(cache)
        }
        None => {
            info!("REDIS_URL not set, vendor cache disabled");
            None
        }
    };

    let state = Arc::new(AppState {
        store: Arc::new(db),
        cache,
        tokens: TokenValidator::new(&config.jwt_secret),
        metrics_handle,
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Vendor Service is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// App state over a fresh in-memory repository, no cache.
#[cfg(test)]
pub fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        store: Arc::new(memory::MemoryStore::new()),
        cache: None,
        tokens: TokenValidator::new(auth::tests::TEST_SECRET),
        metrics_handle: metrics::detached_handle(),
    })
}
