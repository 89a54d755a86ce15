//! Balance lookup, low-stock and balance settings endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::WarehouseId;
use domain::Reconciliation;
use ledger::{StockBalance, StockStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_item_id, parse_warehouse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ReorderLevelBody {
    pub reorder_level: Option<Decimal>,
}

#[derive(Deserialize)]
pub struct ReservedQtyBody {
    pub reserved_qty: Decimal,
}

#[derive(Deserialize)]
pub struct BelowReorderParams {
    pub warehouse_id: Option<WarehouseId>,
}

// -- Response types --

/// A stored balance plus its derived values.
#[derive(Serialize)]
pub struct BalanceResponse {
    #[serde(flatten)]
    pub balance: StockBalance,
    pub available_qty: Decimal,
    pub needs_reorder: bool,
}

impl From<StockBalance> for BalanceResponse {
    fn from(balance: StockBalance) -> Self {
        Self {
            available_qty: balance.available_qty(),
            needs_reorder: balance.needs_reorder(),
            balance,
        }
    }
}

fn to_responses(balances: Vec<StockBalance>) -> Vec<BalanceResponse> {
    balances.into_iter().map(BalanceResponse::from).collect()
}

// -- Handlers --

/// GET /warehouses/{id}/balances — list every balance held in a warehouse.
#[tracing::instrument(skip(state))]
pub async fn list<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BalanceResponse>>, ApiError> {
    let warehouse_id = parse_warehouse_id(&id)?;
    let balances = state.queries.list_balances(warehouse_id).await?;
    Ok(Json(to_responses(balances)))
}

/// GET /warehouses/{id}/balances/{item} — one balance.
#[tracing::instrument(skip(state))]
pub async fn get<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .queries
        .get_balance(parse_warehouse_id(&id)?, parse_item_id(&item)?)
        .await?;
    Ok(Json(balance.into()))
}

/// PUT /warehouses/{id}/balances/{item}/reorder-level — set or clear the reorder level.
#[tracing::instrument(skip(state, body))]
pub async fn set_reorder_level<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<ReorderLevelBody>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .processor
        .set_reorder_level(
            parse_warehouse_id(&id)?,
            parse_item_id(&item)?,
            body.reorder_level,
        )
        .await?;
    Ok(Json(balance.into()))
}

/// PUT /warehouses/{id}/balances/{item}/reserved — record the reserved quantity.
#[tracing::instrument(skip(state, body))]
pub async fn set_reserved_qty<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<ReservedQtyBody>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .processor
        .set_reserved_qty(
            parse_warehouse_id(&id)?,
            parse_item_id(&item)?,
            body.reserved_qty,
        )
        .await?;
    Ok(Json(balance.into()))
}

/// GET /warehouses/{id}/balances/{item}/reconciliation — compare on-hand with the ledger.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item)): Path<(String, String)>,
) -> Result<Json<Reconciliation>, ApiError> {
    let report = state
        .queries
        .reconcile(parse_warehouse_id(&id)?, parse_item_id(&item)?)
        .await?;
    Ok(Json(report))
}

/// GET /balances/below-reorder — balances at or below their reorder level.
#[tracing::instrument(skip(state, params))]
pub async fn below_reorder<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<BelowReorderParams>,
) -> Result<Json<Vec<BalanceResponse>>, ApiError> {
    let balances = state.queries.list_below_reorder(params.warehouse_id).await?;
    Ok(Json(to_responses(balances)))
}
