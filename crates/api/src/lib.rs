//! HTTP API server with observability for the order-processing core.
//!
//! Exposes the order operations over REST, with structured logging
//! (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use common::Money;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::OrderCoordinator;
use store::{InMemoryStore, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route(
            "/orders/items",
            put(routes::orders::update_item::<S>).delete(routes::orders::delete_item::<S>),
        )
        .route("/orders/{order_id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{order_id}/payment",
            put(routes::orders::update_payment::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around `store`, applying the configured
/// retry policy.
pub fn create_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    let coordinator = OrderCoordinator::new(store).with_retry_policy(config.retry_policy());
    Arc::new(AppState::new(coordinator))
}

/// Fills an in-memory store with a small catalog for local runs.
pub async fn seed_demo_catalog(store: &InMemoryStore) {
    let catalog = [
        ("Laptop", "High-performance laptop", 99_999, 10),
        ("Wireless Mouse", "Ergonomic wireless mouse", 2_500, 100),
        ("Mechanical Keyboard", "Tenkeyless mechanical keyboard", 8_900, 50),
        ("USB-C Hub", "7-in-1 USB-C hub", 3_450, 25),
    ];

    for (name, description, cents, stock) in catalog {
        let id = store
            .insert_product(name, description, Money::from_cents(cents), stock)
            .await;
        tracing::debug!(product_id = %id, name, stock, "Seeded demo product");
    }
}
