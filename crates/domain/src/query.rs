//! Read-only access to balances and ledger history.

use common::{BalanceKey, ItemId, WarehouseId};
use ledger::{BalanceStore, LedgerEntry, LedgerQuery, LedgerStore, Page, StockBalance};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StockError};

/// Result of comparing a balance's on-hand with the sum of its ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub on_hand_qty: Decimal,
    pub ledger_qty: Decimal,
    pub in_agreement: bool,
}

/// Balance lookups, low-stock detection and ledger history.
///
/// Reads only committed state, so a transaction is either fully visible or
/// not visible at all.
pub struct QueryService<S> {
    store: S,
}

impl<S> QueryService<S>
where
    S: BalanceStore + LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the balance for a key, or `ItemNotFound` if the warehouse never held the item.
    #[tracing::instrument(skip(self))]
    pub async fn get_balance(
        &self,
        warehouse_id: WarehouseId,
        item_id: ItemId,
    ) -> Result<StockBalance> {
        self.store
            .get_balance(BalanceKey::new(warehouse_id, item_id))
            .await?
            .ok_or(StockError::BalanceNotFound {
                warehouse_id,
                item_id,
            })
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_balances(&self, warehouse_id: WarehouseId) -> Result<Vec<StockBalance>> {
        Ok(self.store.list_balances(Some(warehouse_id)).await?)
    }

    /// Lists balances at or below their reorder level, across all warehouses when none is given.
    #[tracing::instrument(skip(self))]
    pub async fn list_below_reorder(
        &self,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<StockBalance>> {
        let balances = self.store.list_balances(warehouse_id).await?;
        Ok(balances.into_iter().filter(StockBalance::needs_reorder).collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_ledger(&self, query: LedgerQuery) -> Result<Page<LedgerEntry>> {
        Ok(self.store.query_entries(query).await?)
    }

    /// Recomputes on-hand from the ledger and compares it with the stored balance.
    ///
    /// A key with no balance row reconciles against zero.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(
        &self,
        warehouse_id: WarehouseId,
        item_id: ItemId,
    ) -> Result<Reconciliation> {
        let key = BalanceKey::new(warehouse_id, item_id);
        let on_hand_qty = self
            .store
            .get_balance(key)
            .await?
            .map(|b| b.on_hand_qty)
            .unwrap_or_default();
        let ledger_qty = self.store.sum_qty(key).await?;

        let in_agreement = on_hand_qty == ledger_qty;
        if !in_agreement {
            tracing::warn!(%key, %on_hand_qty, %ledger_qty, "balance disagrees with ledger");
        }

        Ok(Reconciliation {
            warehouse_id,
            item_id,
            on_hand_qty,
            ledger_qty,
            in_agreement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{InMemoryStockStore, NewLedgerEntry, StockStore, TransactionKind, UnitOfWork};
    use rust_decimal_macros::dec;

    async fn seed(
        store: &InMemoryStockStore,
        key: BalanceKey,
        on_hand: Decimal,
        reorder: Option<Decimal>,
    ) {
        let mut work = store.begin(&[key]).await.unwrap();
        work.stage_balance(StockBalance {
            on_hand_qty: on_hand,
            reorder_level: reorder,
            ..StockBalance::empty(key)
        })
        .unwrap();
        work.stage_entry(NewLedgerEntry::new(
            key,
            TransactionKind::Receive,
            on_hand,
            dec!(1),
        ))
        .unwrap();
        work.commit().await.unwrap();
    }

    #[tokio::test]
    async fn missing_balance_is_item_not_found() {
        let service = QueryService::new(InMemoryStockStore::new());
        let err = service
            .get_balance(WarehouseId::new(), ItemId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::BalanceNotFound { .. }));
    }

    #[tokio::test]
    async fn below_reorder_filters_by_level_and_warehouse() {
        let store = InMemoryStockStore::new();
        let w1 = WarehouseId::new();
        let w2 = WarehouseId::new();
        let low = BalanceKey::new(w1, ItemId::new());
        let healthy = BalanceKey::new(w1, ItemId::new());
        let unset = BalanceKey::new(w1, ItemId::new());
        let elsewhere = BalanceKey::new(w2, ItemId::new());
        seed(&store, low, dec!(5), Some(dec!(10))).await;
        seed(&store, healthy, dec!(50), Some(dec!(10))).await;
        seed(&store, unset, dec!(0), None).await;
        seed(&store, elsewhere, dec!(1), Some(dec!(1))).await;
        let service = QueryService::new(store);

        let in_w1 = service.list_below_reorder(Some(w1)).await.unwrap();
        assert_eq!(in_w1.len(), 1);
        assert_eq!(in_w1[0].key(), low);

        assert_eq!(service.list_below_reorder(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reconcile_reports_agreement() {
        let store = InMemoryStockStore::new();
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        seed(&store, key, dec!(12.5), None).await;
        let service = QueryService::new(store);

        let report = service
            .reconcile(key.warehouse_id, key.item_id)
            .await
            .unwrap();
        assert!(report.in_agreement);
        assert_eq!(report.ledger_qty, dec!(12.5));

        let untouched = service
            .reconcile(WarehouseId::new(), ItemId::new())
            .await
            .unwrap();
        assert!(untouched.in_agreement);
        assert_eq!(untouched.on_hand_qty, Decimal::ZERO);
    }

    #[tokio::test]
    async fn invalid_ledger_query_is_reported() {
        let service = QueryService::new(InMemoryStockStore::new());
        let err = service
            .get_ledger(LedgerQuery::new().limit(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidQuery);
    }
}
