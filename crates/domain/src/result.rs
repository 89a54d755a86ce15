use chrono::{DateTime, Utc};
use common::{ItemId, WarehouseId};
use ledger::{EntryId, LedgerEntry, TransactionKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::posting::PlannedLine;

/// Confirmation of one committed ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineResult {
    pub entry_id: EntryId,
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub kind: TransactionKind,
    pub timestamp: DateTime<Utc>,
    pub qty: Decimal,
    pub unit_cost: Decimal,
    /// `|qty| × unit_cost`
    pub total_value: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

impl LineResult {
    /// Builds the confirmation for a committed entry and the values planned for it.
    pub fn new(entry: &LedgerEntry, planned: &PlannedLine) -> Self {
        Self {
            entry_id: entry.entry_id,
            warehouse_id: entry.warehouse_id,
            item_id: entry.item_id,
            kind: entry.kind,
            timestamp: entry.timestamp,
            qty: entry.qty,
            unit_cost: entry.unit_cost,
            total_value: planned.total_value,
            balance_before: planned.balance_before,
            balance_after: planned.balance_after,
        }
    }
}

/// Both legs of a committed transfer, in request line order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub from: Vec<LineResult>,
    pub to: Vec<LineResult>,
}
