//! Transaction processor: the five stock movements plus stocktake and
//! balance settings, each committed as one unit of work.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{BalanceKey, ItemId, WarehouseId};
use ledger::{
    NewLedgerEntry, ReferenceKind, StockBalance, StockStore, StoreError, TransactionKind,
    UnitOfWork,
};
use rust_decimal::Decimal;

use crate::error::{Result, StockError, UnavailableReason};
use crate::lookup::{CatalogLookup, WarehouseLookup};
use crate::posting::Posting;
use crate::request::{
    AdjustRequest, IssueRequest, ReceiveRequest, StocktakeRequest, TransferRequest,
    WriteOffRequest,
};
use crate::result::{LineResult, TransferResult};
use crate::validation::{
    require_adjustment_type, require_lines, require_non_negative, require_non_zero,
    require_positive, require_unit_cost,
};

/// Default number of attempts before lock contention is reported.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Tuning for the transaction processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Attempts per request when balance locks are contended.
    pub max_attempts: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What a successful unit of work committed.
struct Committed {
    lines: Vec<LineResult>,
    balances: Vec<StockBalance>,
}

/// Validates stock transactions and commits them atomically.
///
/// Every operation follows the same path: shape checks, warehouse and
/// catalog lookups, then one unit of work that locks the touched balance
/// keys, plans the entries against the locked balances and commits. Lock
/// contention retries the unit of work up to
/// [`ProcessorConfig::max_attempts`] times.
pub struct TransactionProcessor<S, C, W> {
    store: S,
    catalog: C,
    warehouses: W,
    config: ProcessorConfig,
}

impl<S, C, W> TransactionProcessor<S, C, W>
where
    S: StockStore,
    C: CatalogLookup,
    W: WarehouseLookup,
{
    pub fn new(store: S, catalog: C, warehouses: W) -> Self {
        Self {
            store,
            catalog,
            warehouses,
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Receives stock into a warehouse, creating balances as needed.
    #[tracing::instrument(skip(self, request), fields(warehouse_id = %request.warehouse_id, lines = request.lines.len()))]
    pub async fn receive(&self, request: ReceiveRequest) -> Result<Vec<LineResult>> {
        self.observe(TransactionKind::Receive.as_str(), self.post_receipt(request))
            .await
    }

    async fn post_receipt(&self, request: ReceiveRequest) -> Result<Vec<LineResult>> {
        require_lines(&request.lines)?;
        for line in &request.lines {
            require_positive(line.item_id, line.qty)?;
            require_unit_cost(line.item_id, line.unit_cost)?;
        }
        self.require_warehouse(request.warehouse_id).await?;
        let costs = self
            .standard_costs(request.lines.iter().map(|l| l.item_id).collect())
            .await?;

        let keys: Vec<_> = request
            .lines
            .iter()
            .map(|l| BalanceKey::new(request.warehouse_id, l.item_id))
            .collect();

        let committed = self
            .execute(&keys, |posting| {
                for line in &request.lines {
                    let key = BalanceKey::new(request.warehouse_id, line.item_id);
                    let unit_cost = match line.unit_cost {
                        Some(cost) => cost,
                        None => standard_cost(&costs, line.item_id)?,
                    };
                    posting.post(
                        NewLedgerEntry::new(key, TransactionKind::Receive, line.qty, unit_cost)
                            .reference(request.reference_kind, request.reference_id.clone())
                            .notes(request.notes.clone())
                            .performed_by(request.performed_by.clone()),
                    )?;
                }
                Ok(())
            })
            .await?;
        Ok(committed.lines)
    }

    /// Issues stock out of a warehouse, checked against available quantity.
    #[tracing::instrument(skip(self, request), fields(warehouse_id = %request.warehouse_id, lines = request.lines.len()))]
    pub async fn issue(&self, request: IssueRequest) -> Result<Vec<LineResult>> {
        self.observe(TransactionKind::Issue.as_str(), self.post_issue(request))
            .await
    }

    async fn post_issue(&self, request: IssueRequest) -> Result<Vec<LineResult>> {
        require_lines(&request.lines)?;
        for line in &request.lines {
            require_positive(line.item_id, line.qty)?;
        }
        self.require_warehouse(request.warehouse_id).await?;
        let costs = self
            .standard_costs(request.lines.iter().map(|l| l.item_id).collect())
            .await?;

        let keys: Vec<_> = request
            .lines
            .iter()
            .map(|l| BalanceKey::new(request.warehouse_id, l.item_id))
            .collect();

        let committed = self
            .execute(&keys, |posting| {
                for line in &request.lines {
                    let key = BalanceKey::new(request.warehouse_id, line.item_id);
                    posting.require_available(key, line.qty)?;
                    posting.post(
                        NewLedgerEntry::new(
                            key,
                            TransactionKind::Issue,
                            -line.qty,
                            standard_cost(&costs, line.item_id)?,
                        )
                        .reference(request.reference_kind, request.reference_id.clone())
                        .notes(request.notes.clone())
                        .performed_by(request.performed_by.clone()),
                    )?;
                }
                Ok(())
            })
            .await?;
        Ok(committed.lines)
    }

    /// Moves stock between warehouses. Both legs commit together or not at all.
    #[tracing::instrument(skip(self, request), fields(from = %request.from_warehouse_id, to = %request.to_warehouse_id, lines = request.lines.len()))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResult> {
        self.observe(TransactionKind::Transfer.as_str(), self.post_transfer(request))
            .await
    }

    async fn post_transfer(&self, request: TransferRequest) -> Result<TransferResult> {
        require_lines(&request.lines)?;
        for line in &request.lines {
            require_positive(line.item_id, line.qty)?;
        }
        let (from, to) = (request.from_warehouse_id, request.to_warehouse_id);
        if from == to {
            return Err(StockError::InvalidTransfer { warehouse_id: from });
        }
        self.require_warehouse(from).await?;
        self.require_warehouse(to).await?;
        let costs = self
            .standard_costs(request.lines.iter().map(|l| l.item_id).collect())
            .await?;

        let keys: Vec<_> = request
            .lines
            .iter()
            .flat_map(|l| [BalanceKey::new(from, l.item_id), BalanceKey::new(to, l.item_id)])
            .collect();

        let committed = self
            .execute(&keys, |posting| {
                for line in &request.lines {
                    let source = BalanceKey::new(from, line.item_id);
                    let destination = BalanceKey::new(to, line.item_id);
                    let unit_cost = standard_cost(&costs, line.item_id)?;
                    posting.require_available(source, line.qty)?;

                    posting.post(
                        NewLedgerEntry::new(
                            source,
                            TransactionKind::Transfer,
                            -line.qty,
                            unit_cost,
                        )
                        .reference(Some(ReferenceKind::TransferPair), Some(to.to_string()))
                        .notes(request.notes.clone())
                        .performed_by(request.performed_by.clone()),
                    )?;
                    posting.post(
                        NewLedgerEntry::new(
                            destination,
                            TransactionKind::Transfer,
                            line.qty,
                            unit_cost,
                        )
                        .reference(Some(ReferenceKind::TransferPair), Some(from.to_string()))
                        .notes(request.notes.clone())
                        .performed_by(request.performed_by.clone()),
                    )?;
                }
                Ok(())
            })
            .await?;

        let (from_lines, to_lines) = committed
            .lines
            .into_iter()
            .partition(|line| line.warehouse_id == from);
        Ok(TransferResult {
            from: from_lines,
            to: to_lines,
        })
    }

    /// Applies signed corrections to on-hand stock of existing balances.
    #[tracing::instrument(skip(self, request), fields(warehouse_id = %request.warehouse_id, adjustment_type = %request.adjustment_type, lines = request.lines.len()))]
    pub async fn adjust(&self, request: AdjustRequest) -> Result<Vec<LineResult>> {
        self.observe(TransactionKind::Adjust.as_str(), self.post_adjustment(request))
            .await
    }

    async fn post_adjustment(&self, request: AdjustRequest) -> Result<Vec<LineResult>> {
        require_adjustment_type(request.adjustment_type)?;
        require_lines(&request.lines)?;
        for line in &request.lines {
            require_non_zero(line.item_id, line.qty_adjustment)?;
        }
        self.require_warehouse(request.warehouse_id).await?;
        let costs = self
            .standard_costs(request.lines.iter().map(|l| l.item_id).collect())
            .await?;

        let keys: Vec<_> = request
            .lines
            .iter()
            .map(|l| BalanceKey::new(request.warehouse_id, l.item_id))
            .collect();

        let committed = self
            .execute(&keys, |posting| {
                for line in &request.lines {
                    let key = BalanceKey::new(request.warehouse_id, line.item_id);
                    posting.existing(key)?;
                    posting.post(
                        NewLedgerEntry::new(
                            key,
                            TransactionKind::Adjust,
                            line.qty_adjustment,
                            standard_cost(&costs, line.item_id)?,
                        )
                        .reference(Some(request.adjustment_type), request.reference_id.clone())
                        .notes(request.notes.clone())
                        .performed_by(request.performed_by.clone()),
                    )?;
                }
                Ok(())
            })
            .await?;
        Ok(committed.lines)
    }

    /// Writes off damaged or expired stock, checked against on-hand rather than available.
    #[tracing::instrument(skip(self, request), fields(warehouse_id = %request.warehouse_id, item_id = %request.item_id, qty = %request.qty))]
    pub async fn write_off(&self, request: WriteOffRequest) -> Result<LineResult> {
        self.observe(TransactionKind::WriteOff.as_str(), self.post_write_off(request))
            .await
    }

    async fn post_write_off(&self, request: WriteOffRequest) -> Result<LineResult> {
        require_positive(request.item_id, request.qty)?;
        self.require_warehouse(request.warehouse_id).await?;
        let costs = self.standard_costs(vec![request.item_id]).await?;
        let unit_cost = standard_cost(&costs, request.item_id)?;
        let key = BalanceKey::new(request.warehouse_id, request.item_id);

        let committed = self
            .execute(&[key], |posting| {
                posting.require_on_hand(key, request.qty)?;
                posting.post(
                    NewLedgerEntry::new(key, TransactionKind::WriteOff, -request.qty, unit_cost)
                        .reference(Some(ReferenceKind::WriteOff), None)
                        .notes(Some(request.reason.clone()))
                        .performed_by(request.performed_by.clone()),
                )?;
                Ok(())
            })
            .await?;

        committed.lines.into_iter().next().ok_or_else(|| {
            StockError::Store(StoreError::Corrupt(
                "write-off committed without an entry".to_string(),
            ))
        })
    }

    /// Records physical counts, adjusting on-hand to match.
    ///
    /// Lines whose count equals on-hand write no entry but still update
    /// `last_counted_at`. Returns results for the lines that moved stock.
    #[tracing::instrument(skip(self, request), fields(warehouse_id = %request.warehouse_id, lines = request.lines.len()))]
    pub async fn stocktake(&self, request: StocktakeRequest) -> Result<Vec<LineResult>> {
        self.observe("STOCKTAKE", self.post_stocktake(request))
            .await
    }

    async fn post_stocktake(&self, request: StocktakeRequest) -> Result<Vec<LineResult>> {
        require_lines(&request.lines)?;
        for line in &request.lines {
            require_non_negative(line.item_id, line.counted_qty)?;
        }
        self.require_warehouse(request.warehouse_id).await?;
        let costs = self
            .standard_costs(request.lines.iter().map(|l| l.item_id).collect())
            .await?;

        let keys: Vec<_> = request
            .lines
            .iter()
            .map(|l| BalanceKey::new(request.warehouse_id, l.item_id))
            .collect();
        let counted_at = Utc::now();

        let committed = self
            .execute(&keys, |posting| {
                for line in &request.lines {
                    let key = BalanceKey::new(request.warehouse_id, line.item_id);
                    let delta = line.counted_qty - posting.existing(key)?.on_hand_qty;
                    if !delta.is_zero() {
                        posting.post(
                            NewLedgerEntry::new(
                                key,
                                TransactionKind::Adjust,
                                delta,
                                standard_cost(&costs, line.item_id)?,
                            )
                            .reference(
                                Some(ReferenceKind::Stocktake),
                                request.reference_id.clone(),
                            )
                            .notes(request.notes.clone())
                            .performed_by(request.performed_by.clone()),
                        )?;
                    }
                    let mut balance = posting.existing(key)?.clone();
                    balance.last_counted_at = Some(counted_at);
                    posting.update(balance)?;
                }
                Ok(())
            })
            .await?;
        Ok(committed.lines)
    }

    /// Sets or clears the reorder level of an existing balance.
    #[tracing::instrument(skip(self))]
    pub async fn set_reorder_level(
        &self,
        warehouse_id: WarehouseId,
        item_id: ItemId,
        reorder_level: Option<Decimal>,
    ) -> Result<StockBalance> {
        self.observe("SET_REORDER_LEVEL", async {
            if let Some(level) = reorder_level {
                require_non_negative(item_id, level)?;
            }
            self.require_warehouse(warehouse_id).await?;
            let key = BalanceKey::new(warehouse_id, item_id);

            let committed = self
                .execute(&[key], |posting| {
                    let mut balance = posting.existing(key)?.clone();
                    balance.reorder_level = reorder_level;
                    posting.update(balance)
                })
                .await?;
            single_balance(committed)
        })
        .await
    }

    /// Records the quantity held by reservations against an existing balance.
    ///
    /// Reservations never exceed on-hand at the time they are set. No ledger
    /// entry is written since on-hand does not change.
    #[tracing::instrument(skip(self))]
    pub async fn set_reserved_qty(
        &self,
        warehouse_id: WarehouseId,
        item_id: ItemId,
        reserved_qty: Decimal,
    ) -> Result<StockBalance> {
        self.observe("SET_RESERVED_QTY", async {
            require_non_negative(item_id, reserved_qty)?;
            self.require_warehouse(warehouse_id).await?;
            let key = BalanceKey::new(warehouse_id, item_id);

            let committed = self
                .execute(&[key], |posting| {
                    let mut balance = posting.existing(key)?.clone();
                    if reserved_qty > balance.on_hand_qty {
                        return Err(StockError::ReservationExceedsOnHand {
                            warehouse_id,
                            item_id,
                            on_hand: balance.on_hand_qty,
                            reserved: reserved_qty,
                        });
                    }
                    balance.reserved_qty = reserved_qty;
                    posting.update(balance)
                })
                .await?;
            single_balance(committed)
        })
        .await
    }

    /// Runs a planning function inside a unit of work over `keys`, retrying on lock contention.
    async fn execute<P>(&self, keys: &[BalanceKey], plan: P) -> Result<Committed>
    where
        P: Fn(&mut Posting) -> Result<()> + Send + Sync,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(keys, &plan).await {
                Err(StockError::Store(err)) if err.is_conflict() => {
                    if attempt >= max_attempts {
                        tracing::warn!(attempts = attempt, error = %err, "giving up on contended balances");
                        return Err(StockError::ConcurrentModification { attempts: attempt });
                    }
                    tracing::debug!(attempt, error = %err, "balance locks contended, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn attempt<P>(&self, keys: &[BalanceKey], plan: &P) -> Result<Committed>
    where
        P: Fn(&mut Posting) -> Result<()> + Send + Sync,
    {
        let mut work = self.store.begin(keys).await?;

        let locked = work.locked_keys().to_vec();
        tracing::debug!(keys = locked.len(), "balance locks acquired");
        let mut snapshot = Vec::with_capacity(locked.len());
        for key in locked {
            snapshot.push((key, work.load_balance(key).await?));
        }

        let mut posting = Posting::new(snapshot);
        if let Err(err) = plan(&mut posting) {
            work.rollback().await?;
            return Err(err);
        }

        let (balances, planned) = posting.into_parts();
        for balance in &balances {
            work.stage_balance(balance.clone())?;
        }
        for line in &planned {
            work.stage_entry(line.entry.clone())?;
        }
        let entries = work.commit().await?;

        let lines = entries
            .iter()
            .zip(&planned)
            .map(|(entry, line)| LineResult::new(entry, line))
            .collect();
        Ok(Committed { lines, balances })
    }

    async fn require_warehouse(&self, warehouse_id: WarehouseId) -> Result<()> {
        let warehouse = self
            .warehouses
            .get_warehouse(warehouse_id)
            .await
            .map_err(|e| StockError::DependencyUnavailable(e.to_string()))?;

        match warehouse {
            Some(w) if w.is_active => Ok(()),
            Some(_) => Err(StockError::WarehouseUnavailable {
                warehouse_id,
                reason: UnavailableReason::Inactive,
            }),
            None => Err(StockError::WarehouseUnavailable {
                warehouse_id,
                reason: UnavailableReason::NotFound,
            }),
        }
    }

    /// Looks up each distinct item once and returns its standard cost.
    async fn standard_costs(&self, item_ids: Vec<ItemId>) -> Result<HashMap<ItemId, Decimal>> {
        let mut costs = HashMap::with_capacity(item_ids.len());
        for item_id in item_ids {
            if costs.contains_key(&item_id) {
                continue;
            }
            let item = self
                .catalog
                .get_item(item_id)
                .await
                .map_err(|e| StockError::DependencyUnavailable(e.to_string()))?
                .ok_or(StockError::ItemNotFound { item_id })?;
            require_unit_cost(item_id, Some(item.standard_unit_cost))?;
            costs.insert(item_id, item.standard_unit_cost);
        }
        Ok(costs)
    }

    /// Records duration and outcome metrics for one operation.
    async fn observe<T>(
        &self,
        kind: &'static str,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = operation.await;
        metrics::histogram!("stock_transaction_duration_seconds", "kind" => kind)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                metrics::counter!("stock_transactions_committed_total", "kind" => kind)
                    .increment(1);
                tracing::info!(kind, "stock transaction committed");
            }
            Err(err) => {
                let reason = err.kind().as_str();
                metrics::counter!(
                    "stock_transactions_rejected_total",
                    "kind" => kind,
                    "reason" => reason
                )
                .increment(1);
                tracing::warn!(kind, reason, error = %err, "stock transaction rejected");
            }
        }
        result
    }
}

fn standard_cost(costs: &HashMap<ItemId, Decimal>, item_id: ItemId) -> Result<Decimal> {
    costs
        .get(&item_id)
        .copied()
        .ok_or(StockError::ItemNotFound { item_id })
}

fn single_balance(committed: Committed) -> Result<StockBalance> {
    committed.balances.into_iter().next().ok_or_else(|| {
        StockError::Store(StoreError::Corrupt(
            "balance update committed without a balance".to_string(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{InMemoryCatalog, InMemoryWarehouses, Item, Warehouse};
    use crate::request::{AdjustLine, CountLine, ReceiveLine, StockLine};
    use ledger::{BalanceStore, InMemoryStockStore, LedgerQuery, LedgerStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        processor: TransactionProcessor<InMemoryStockStore, InMemoryCatalog, InMemoryWarehouses>,
        catalog: InMemoryCatalog,
        warehouses: InMemoryWarehouses,
        w1: WarehouseId,
        w2: WarehouseId,
        item: ItemId,
    }

    fn fixture() -> Fixture {
        let w1 = WarehouseId::new();
        let w2 = WarehouseId::new();
        let item = ItemId::new();
        let catalog: InMemoryCatalog = [Item::new(item, dec!(15.75))].into_iter().collect();
        let warehouses: InMemoryWarehouses = [Warehouse::active(w1), Warehouse::active(w2)]
            .into_iter()
            .collect();
        let processor = TransactionProcessor::new(
            InMemoryStockStore::new(),
            catalog.clone(),
            warehouses.clone(),
        );
        Fixture {
            processor,
            catalog,
            warehouses,
            w1,
            w2,
            item,
        }
    }

    impl Fixture {
        async fn stock(&self, qty: Decimal) {
            self.processor
                .receive(ReceiveRequest::new(
                    self.w1,
                    vec![ReceiveLine::new(self.item, qty)],
                ))
                .await
                .unwrap();
        }

        async fn on_hand(&self, warehouse_id: WarehouseId) -> Option<Decimal> {
            self.processor
                .store()
                .get_balance(BalanceKey::new(warehouse_id, self.item))
                .await
                .unwrap()
                .map(|b| b.on_hand_qty)
        }
    }

    #[tokio::test]
    async fn receive_without_cost_uses_standard_cost() {
        let f = fixture();
        let lines = f
            .processor
            .receive(ReceiveRequest::new(f.w1, vec![ReceiveLine::new(f.item, dec!(4))]))
            .await
            .unwrap();
        assert_eq!(lines[0].unit_cost, dec!(15.75));
        assert_eq!(lines[0].total_value, dec!(63.00));
    }

    #[tokio::test]
    async fn issue_uses_standard_cost_not_receipt_cost() {
        let f = fixture();
        f.processor
            .receive(ReceiveRequest::new(
                f.w1,
                vec![ReceiveLine::new(f.item, dec!(10)).at_cost(dec!(99))],
            ))
            .await
            .unwrap();

        let lines = f
            .processor
            .issue(IssueRequest::new(f.w1, vec![StockLine::new(f.item, dec!(2))]))
            .await
            .unwrap();
        assert_eq!(lines[0].qty, dec!(-2));
        assert_eq!(lines[0].unit_cost, dec!(15.75));
        assert_eq!(lines[0].total_value, dec!(31.50));
    }

    #[tokio::test]
    async fn empty_request_is_invalid_quantity() {
        let f = fixture();
        let err = f
            .processor
            .receive(ReceiveRequest::new(f.w1, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidQuantity);
    }

    #[tokio::test]
    async fn quantity_checks_run_before_lookups() {
        let f = fixture();
        f.catalog.set_unavailable(true);
        f.warehouses.set_unavailable(true);

        let err = f
            .processor
            .issue(IssueRequest::new(f.w1, vec![StockLine::new(f.item, dec!(0))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity { .. }));
    }

    #[tokio::test]
    async fn lookup_failure_is_dependency_unavailable() {
        let f = fixture();
        f.catalog.set_unavailable(true);

        let err = f
            .processor
            .receive(ReceiveRequest::new(f.w1, vec![ReceiveLine::new(f.item, dec!(1))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::DependencyUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn inactive_warehouse_is_rejected() {
        let f = fixture();
        let closed = WarehouseId::new();
        f.warehouses.insert(Warehouse::inactive(closed));

        let err = f
            .processor
            .receive(ReceiveRequest::new(closed, vec![ReceiveLine::new(f.item, dec!(1))]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::WarehouseUnavailable {
                reason: UnavailableReason::Inactive,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn duplicate_issue_lines_are_checked_cumulatively() {
        let f = fixture();
        f.stock(dec!(10)).await;

        let err = f
            .processor
            .issue(IssueRequest::new(
                f.w1,
                vec![
                    StockLine::new(f.item, dec!(6)),
                    StockLine::new(f.item, dec!(6)),
                ],
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientStock { available, .. } if available == dec!(4)
        ));
        assert_eq!(f.on_hand(f.w1).await, Some(dec!(10)));
    }

    #[tokio::test]
    async fn reserved_stock_blocks_issue_but_not_write_off() {
        let f = fixture();
        f.stock(dec!(10)).await;
        f.processor
            .set_reserved_qty(f.w1, f.item, dec!(8))
            .await
            .unwrap();

        let err = f
            .processor
            .issue(IssueRequest::new(f.w1, vec![StockLine::new(f.item, dec!(3))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));

        let line = f
            .processor
            .write_off(WriteOffRequest::new(f.w1, f.item, dec!(10), "flood damage"))
            .await
            .unwrap();
        assert_eq!(line.balance_after, dec!(0));
    }

    #[tokio::test]
    async fn write_off_records_reason_and_reference() {
        let f = fixture();
        f.stock(dec!(5)).await;

        f.processor
            .write_off(
                WriteOffRequest::new(f.w1, f.item, dec!(2), "expired").performed_by("clerk-7"),
            )
            .await
            .unwrap();

        let page = f
            .processor
            .store()
            .query_entries(LedgerQuery::new().kind(TransactionKind::WriteOff))
            .await
            .unwrap();
        let entry = &page.items[0];
        assert_eq!(entry.qty, dec!(-2));
        assert_eq!(entry.reference_kind, Some(ReferenceKind::WriteOff));
        assert_eq!(entry.notes.as_deref(), Some("expired"));
        assert_eq!(entry.performed_by.as_deref(), Some("clerk-7"));
    }

    #[tokio::test]
    async fn write_off_beyond_on_hand_is_insufficient() {
        let f = fixture();
        f.stock(dec!(5)).await;
        let err = f
            .processor
            .write_off(WriteOffRequest::new(f.w1, f.item, dec!(6), "lost"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientStock { available, requested, .. }
                if available == dec!(5) && requested == dec!(6)
        ));
    }

    #[tokio::test]
    async fn adjust_requires_existing_balance() {
        let f = fixture();
        let err = f
            .processor
            .adjust(AdjustRequest::new(
                f.w1,
                vec![AdjustLine::new(f.item, dec!(5))],
                ReferenceKind::Correction,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::BalanceNotFound { .. }));
    }

    #[tokio::test]
    async fn adjust_records_adjustment_type() {
        let f = fixture();
        f.stock(dec!(5)).await;
        let lines = f
            .processor
            .adjust(
                AdjustRequest::new(
                    f.w1,
                    vec![AdjustLine::new(f.item, dec!(-2))],
                    ReferenceKind::Damage,
                )
                .reference_id("INC-4"),
            )
            .await
            .unwrap();
        assert_eq!(lines[0].balance_after, dec!(3));

        let page = f
            .processor
            .store()
            .query_entries(LedgerQuery::new().reference_kind(ReferenceKind::Damage))
            .await
            .unwrap();
        assert_eq!(page.items[0].reference_id.as_deref(), Some("INC-4"));
    }

    #[tokio::test]
    async fn adjust_rejects_non_adjustment_reference_kind() {
        let f = fixture();
        f.stock(dec!(5)).await;
        let err = f
            .processor
            .adjust(AdjustRequest::new(
                f.w1,
                vec![AdjustLine::new(f.item, dec!(1))],
                ReferenceKind::TransferPair,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidAdjustmentType { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::InvalidQuantity);
        assert_eq!(f.processor.store().entry_count().await, 1);
        assert_eq!(f.on_hand(f.w1).await, Some(dec!(5)));
    }

    #[tokio::test]
    async fn receive_with_unstorable_value_commits_nothing() {
        let f = fixture();
        let err = f
            .processor
            .receive(ReceiveRequest::new(
                f.w1,
                vec![
                    ReceiveLine::new(f.item, dec!(100000000000000000000))
                        .at_cost(dec!(10000000000)),
                ],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity { .. }));
        assert_eq!(f.processor.store().entry_count().await, 0);
        assert_eq!(f.on_hand(f.w1).await, None);
    }

    #[tokio::test]
    async fn receive_of_decimal_max_is_invalid_quantity() {
        let f = fixture();
        let err = f
            .processor
            .receive(ReceiveRequest::new(
                f.w1,
                vec![ReceiveLine::new(f.item, Decimal::MAX)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity { .. }));
        assert_eq!(f.processor.store().entry_count().await, 0);
    }

    #[tokio::test]
    async fn receive_beyond_stored_precision_commits_nothing() {
        let f = fixture();
        let err = f
            .processor
            .receive(ReceiveRequest::new(
                f.w1,
                vec![ReceiveLine::new(f.item, dec!(0.0000004))],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity { .. }));
        assert_eq!(f.processor.store().entry_count().await, 0);
    }

    #[tokio::test]
    async fn receive_past_storable_on_hand_keeps_balance() {
        let f = fixture();
        f.stock(dec!(99999999999999)).await;
        let err = f
            .processor
            .receive(ReceiveRequest::new(
                f.w1,
                vec![ReceiveLine::new(f.item, dec!(1)).at_cost(dec!(0))],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::BalanceOutOfRange { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::InvalidQuantity);
        assert_eq!(f.on_hand(f.w1).await, Some(dec!(99999999999999)));
        assert_eq!(f.processor.store().entry_count().await, 1);
    }

    #[tokio::test]
    async fn negative_catalog_cost_is_invalid_unit_cost() {
        let f = fixture();
        let cheap = ItemId::new();
        f.catalog.insert(Item::new(cheap, dec!(-1)));
        let err = f
            .processor
            .receive(ReceiveRequest::new(f.w1, vec![ReceiveLine::new(cheap, dec!(1))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidUnitCost { .. }));
        assert_eq!(f.processor.store().entry_count().await, 0);
    }

    #[tokio::test]
    async fn stocktake_adjusts_to_count_and_stamps_balance() {
        let f = fixture();
        f.stock(dec!(40)).await;

        let lines = f
            .processor
            .stocktake(StocktakeRequest::new(f.w1, vec![CountLine::new(f.item, dec!(37))]))
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, TransactionKind::Adjust);
        assert_eq!(lines[0].qty, dec!(-3));

        let balance = f
            .processor
            .store()
            .get_balance(BalanceKey::new(f.w1, f.item))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.on_hand_qty, dec!(37));
        assert!(balance.last_counted_at.is_some());
    }

    #[tokio::test]
    async fn stocktake_matching_count_writes_no_entry() {
        let f = fixture();
        f.stock(dec!(12)).await;

        let lines = f
            .processor
            .stocktake(StocktakeRequest::new(f.w1, vec![CountLine::new(f.item, dec!(12))]))
            .await
            .unwrap();
        assert!(lines.is_empty());
        assert_eq!(f.processor.store().entry_count().await, 1);
    }

    #[tokio::test]
    async fn reservation_cannot_exceed_on_hand() {
        let f = fixture();
        f.stock(dec!(5)).await;
        let err = f
            .processor
            .set_reserved_qty(f.w1, f.item, dec!(6))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::ReservationExceedsOnHand { .. }));
    }

    #[tokio::test]
    async fn reorder_level_round_trips() {
        let f = fixture();
        f.stock(dec!(5)).await;

        let balance = f
            .processor
            .set_reorder_level(f.w1, f.item, Some(dec!(10)))
            .await
            .unwrap();
        assert!(balance.needs_reorder());

        let cleared = f
            .processor
            .set_reorder_level(f.w1, f.item, None)
            .await
            .unwrap();
        assert!(!cleared.needs_reorder());
        assert_eq!(f.processor.store().entry_count().await, 1);
    }

    #[tokio::test]
    async fn transfer_to_missing_warehouse_commits_nothing() {
        let f = fixture();
        f.stock(dec!(5)).await;
        let err = f
            .processor
            .transfer(TransferRequest::new(
                f.w1,
                WarehouseId::new(),
                vec![StockLine::new(f.item, dec!(1))],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::WarehouseUnavailable { .. }));
        assert_eq!(f.on_hand(f.w1).await, Some(dec!(5)));
        assert_eq!(f.on_hand(f.w2).await, None);
    }

    #[tokio::test]
    async fn held_lock_exhausts_retries() {
        let w1 = WarehouseId::new();
        let item = ItemId::new();
        let store = InMemoryStockStore::new().with_lock_timeout(Duration::from_millis(10));
        let processor = TransactionProcessor::new(
            store.clone(),
            [Item::new(item, dec!(1))].into_iter().collect::<InMemoryCatalog>(),
            [Warehouse::active(w1)].into_iter().collect::<InMemoryWarehouses>(),
        )
        .with_config(ProcessorConfig { max_attempts: 2 });

        let _held = store.begin(&[BalanceKey::new(w1, item)]).await.unwrap();
        let err = processor
            .receive(ReceiveRequest::new(w1, vec![ReceiveLine::new(item, dec!(1))]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::ConcurrentModification { attempts: 2 }
        ));
        assert!(err.is_retryable());
    }
}
