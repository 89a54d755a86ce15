//! HTTP API server for the stock ledger.
//!
//! Exposes stock movements, balance lookups and ledger history as REST
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{
    InMemoryCatalog, InMemoryWarehouses, ProcessorConfig, QueryService, TransactionProcessor,
};
use ledger::StockStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StockStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/warehouses/{id}/receipts",
            post(routes::transactions::receive::<S>),
        )
        .route(
            "/warehouses/{id}/issues",
            post(routes::transactions::issue::<S>),
        )
        .route(
            "/warehouses/{id}/adjustments",
            post(routes::transactions::adjust::<S>),
        )
        .route(
            "/warehouses/{id}/write-offs",
            post(routes::transactions::write_off::<S>),
        )
        .route(
            "/warehouses/{id}/stocktakes",
            post(routes::transactions::stocktake::<S>),
        )
        .route("/transfers", post(routes::transactions::transfer::<S>))
        .route(
            "/warehouses/{id}/balances",
            get(routes::balances::list::<S>),
        )
        .route(
            "/warehouses/{id}/balances/{item}",
            get(routes::balances::get::<S>),
        )
        .route(
            "/warehouses/{id}/balances/{item}/reorder-level",
            put(routes::balances::set_reorder_level::<S>),
        )
        .route(
            "/warehouses/{id}/balances/{item}/reserved",
            put(routes::balances::set_reserved_qty::<S>),
        )
        .route(
            "/warehouses/{id}/balances/{item}/reconciliation",
            get(routes::balances::reconcile::<S>),
        )
        .route(
            "/balances/below-reorder",
            get(routes::balances::below_reorder::<S>),
        )
        .route("/ledger", get(routes::ledger::list::<S>))
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

/// Creates the application state over a store and the in-memory lookups.
///
/// The processor and the query service share the same store handle.
pub fn create_state<S: StockStore + Clone + 'static>(
    store: S,
    backend: &'static str,
    catalog: InMemoryCatalog,
    warehouses: InMemoryWarehouses,
    config: ProcessorConfig,
) -> Arc<AppState<S>> {
    let processor = TransactionProcessor::new(store.clone(), catalog.clone(), warehouses.clone())
        .with_config(config);
    let queries = QueryService::new(store);

    Arc::new(AppState {
        processor,
        queries,
        catalog,
        warehouses,
        backend,
    })
}
