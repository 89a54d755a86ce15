//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use ledger::StockStore;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub items: usize,
    pub warehouses: usize,
}

/// GET /health — reports the storage backend and the size of the lookup data.
pub async fn check<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.backend,
        items: state.catalog.len(),
        warehouses: state.warehouses.len(),
    })
}
