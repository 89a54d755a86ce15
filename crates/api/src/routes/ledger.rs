//! Ledger history endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use common::{ItemId, WarehouseId};
use ledger::{
    LedgerEntry, LedgerQuery, LedgerSortBy, Page, ReferenceKind, SortOrder, StockStore,
    TransactionKind,
};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

/// Query string accepted by `GET /ledger`. Every filter is optional.
#[derive(Debug, Default, Deserialize)]
pub struct LedgerParams {
    pub warehouse_id: Option<WarehouseId>,
    pub item_id: Option<ItemId>,
    pub kind: Option<TransactionKind>,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<LedgerSortBy>,
    pub sort_order: Option<SortOrder>,
}

impl From<LedgerParams> for LedgerQuery {
    fn from(params: LedgerParams) -> Self {
        let defaults = LedgerQuery::new();
        LedgerQuery {
            warehouse_id: params.warehouse_id,
            item_id: params.item_id,
            kind: params.kind,
            reference_kind: params.reference_kind,
            reference_id: params.reference_id,
            from_timestamp: params.from,
            to_timestamp: params.to,
            page: params.page.unwrap_or(defaults.page),
            limit: params.limit.unwrap_or(defaults.limit),
            sort_by: params.sort_by.unwrap_or(defaults.sort_by),
            sort_order: params.sort_order.unwrap_or(defaults.sort_order),
        }
    }
}

/// GET /ledger — one page of ledger entries, most recent first by default.
#[tracing::instrument(skip(state))]
pub async fn list<S: StockStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<Page<LedgerEntry>>, ApiError> {
    let page = state.queries.get_ledger(params.into()).await?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::query::DEFAULT_PAGE_SIZE;

    #[test]
    fn test_missing_params_use_query_defaults() {
        let query = LedgerQuery::from(LedgerParams::default());
        assert_eq!(query, LedgerQuery::new());
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_params_carry_filters() {
        let item_id = ItemId::new();
        let query = LedgerQuery::from(LedgerParams {
            item_id: Some(item_id),
            kind: Some(TransactionKind::Issue),
            page: Some(2),
            sort_order: Some(SortOrder::Asc),
            ..LedgerParams::default()
        });
        assert_eq!(query.item_id, Some(item_id));
        assert_eq!(query.kind, Some(TransactionKind::Issue));
        assert_eq!(query.page, 2);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }
}
