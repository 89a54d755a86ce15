//! Stock movement endpoints: receipts, issues, adjustments, write-offs,
//! stocktakes and transfers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{ItemId, WarehouseId};
use domain::{
    AdjustLine, AdjustRequest, CountLine, IssueRequest, LineResult, ReceiveLine, ReceiveRequest,
    StockLine, StocktakeRequest, TransferRequest, TransferResult, WriteOffRequest,
};
use ledger::{ReferenceKind, StockStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AppState, actor, parse_warehouse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ReceiveBody {
    pub lines: Vec<ReceiveLine>,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct IssueBody {
    pub lines: Vec<StockLine>,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct AdjustBody {
    pub lines: Vec<AdjustLine>,
    pub adjustment_type: ReferenceKind,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct WriteOffBody {
    pub item_id: ItemId,
    pub qty: Decimal,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct StocktakeBody {
    pub lines: Vec<CountLine>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct TransferBody {
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub lines: Vec<StockLine>,
    pub notes: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct LinesResponse {
    pub lines: Vec<LineResult>,
}

// -- Handlers --

/// POST /warehouses/{id}/receipts — receive stock.
#[tracing::instrument(skip(state, headers, body))]
pub async fn receive<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReceiveBody>,
) -> Result<(StatusCode, Json<LinesResponse>), ApiError> {
    let request = ReceiveRequest {
        warehouse_id: parse_warehouse_id(&id)?,
        lines: body.lines,
        reference_kind: body.reference_kind,
        reference_id: body.reference_id,
        notes: body.notes,
        performed_by: actor(&headers),
    };
    let lines = state.processor.receive(request).await?;
    Ok((StatusCode::CREATED, Json(LinesResponse { lines })))
}

/// POST /warehouses/{id}/issues — issue stock.
#[tracing::instrument(skip(state, headers, body))]
pub async fn issue<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<IssueBody>,
) -> Result<(StatusCode, Json<LinesResponse>), ApiError> {
    let request = IssueRequest {
        warehouse_id: parse_warehouse_id(&id)?,
        lines: body.lines,
        reference_kind: body.reference_kind,
        reference_id: body.reference_id,
        notes: body.notes,
        performed_by: actor(&headers),
    };
    let lines = state.processor.issue(request).await?;
    Ok((StatusCode::CREATED, Json(LinesResponse { lines })))
}

/// POST /warehouses/{id}/adjustments — apply signed corrections.
#[tracing::instrument(skip(state, headers, body))]
pub async fn adjust<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AdjustBody>,
) -> Result<(StatusCode, Json<LinesResponse>), ApiError> {
    let request = AdjustRequest {
        warehouse_id: parse_warehouse_id(&id)?,
        lines: body.lines,
        adjustment_type: body.adjustment_type,
        reference_id: body.reference_id,
        notes: body.notes,
        performed_by: actor(&headers),
    };
    let lines = state.processor.adjust(request).await?;
    Ok((StatusCode::CREATED, Json(LinesResponse { lines })))
}

/// POST /warehouses/{id}/write-offs — write off damaged or expired stock.
#[tracing::instrument(skip(state, headers, body))]
pub async fn write_off<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<WriteOffBody>,
) -> Result<(StatusCode, Json<LineResult>), ApiError> {
    let request = WriteOffRequest {
        warehouse_id: parse_warehouse_id(&id)?,
        item_id: body.item_id,
        qty: body.qty,
        reason: body.reason,
        performed_by: actor(&headers),
    };
    let line = state.processor.write_off(request).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// POST /warehouses/{id}/stocktakes — record physical counts.
#[tracing::instrument(skip(state, headers, body))]
pub async fn stocktake<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<StocktakeBody>,
) -> Result<(StatusCode, Json<LinesResponse>), ApiError> {
    let request = StocktakeRequest {
        warehouse_id: parse_warehouse_id(&id)?,
        lines: body.lines,
        reference_id: body.reference_id,
        notes: body.notes,
        performed_by: actor(&headers),
    };
    let lines = state.processor.stocktake(request).await?;
    Ok((StatusCode::CREATED, Json(LinesResponse { lines })))
}

/// POST /transfers — move stock between two warehouses.
#[tracing::instrument(skip(state, headers, body))]
pub async fn transfer<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<TransferBody>,
) -> Result<(StatusCode, Json<TransferResult>), ApiError> {
    let request = TransferRequest {
        from_warehouse_id: body.from_warehouse_id,
        to_warehouse_id: body.to_warehouse_id,
        lines: body.lines,
        notes: body.notes,
        performed_by: actor(&headers),
    };
    let result = state.processor.transfer(request).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
