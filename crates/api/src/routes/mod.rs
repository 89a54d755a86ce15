//! HTTP route handlers.

pub mod balances;
pub mod health;
pub mod ledger;
pub mod metrics;
pub mod transactions;

use axum::http::HeaderMap;
use common::{ItemId, WarehouseId};
use domain::{InMemoryCatalog, InMemoryWarehouses, QueryService, TransactionProcessor};
use ::ledger::StockStore;

use crate::error::ApiError;

/// Header carrying the caller identity recorded on ledger entries.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S: StockStore> {
    pub processor: TransactionProcessor<S, InMemoryCatalog, InMemoryWarehouses>,
    pub queries: QueryService<S>,
    pub catalog: InMemoryCatalog,
    pub warehouses: InMemoryWarehouses,
    /// Name of the storage backend, reported by the health check.
    pub backend: &'static str,
}

pub(crate) fn parse_warehouse_id(id: &str) -> Result<WarehouseId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid warehouse id: {e}")))
}

pub(crate) fn parse_item_id(id: &str) -> Result<ItemId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid item id: {e}")))
}

/// Returns the caller identity from the actor header, if present.
pub(crate) fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}
