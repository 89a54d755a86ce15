use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BalanceKey, ItemId, WarehouseId};

/// Identifier of a committed ledger entry.
///
/// Entry ids are assigned by the store at commit time and increase
/// monotonically across the whole ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    /// Creates an entry id from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw entry id value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntryId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Returned when a stored kind tag does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct ParseKindError {
    what: &'static str,
    value: String,
}

/// The kind of stock movement a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Stock arriving into a warehouse.
    Receive,
    /// Stock consumed out of a warehouse.
    Issue,
    /// One leg of a movement between two warehouses.
    Transfer,
    /// A signed correction, typically from a stocktake.
    Adjust,
    /// Damaged or expired stock removed from on-hand.
    WriteOff,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 5] = [
        TransactionKind::Receive,
        TransactionKind::Issue,
        TransactionKind::Transfer,
        TransactionKind::Adjust,
        TransactionKind::WriteOff,
    ];

    /// Returns the stored tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Receive => "RECEIVE",
            TransactionKind::Issue => "ISSUE",
            TransactionKind::Transfer => "TRANSFER",
            TransactionKind::Adjust => "ADJUST",
            TransactionKind::WriteOff => "WRITE_OFF",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError {
                what: "transaction kind",
                value: s.to_string(),
            })
    }
}

/// The business document or reason a ledger entry points back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    PurchaseOrder,
    WorkOrder,
    Stocktake,
    Damage,
    Expiry,
    Correction,
    /// The other leg of a transfer; the reference id is the paired warehouse.
    TransferPair,
    WriteOff,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 8] = [
        ReferenceKind::PurchaseOrder,
        ReferenceKind::WorkOrder,
        ReferenceKind::Stocktake,
        ReferenceKind::Damage,
        ReferenceKind::Expiry,
        ReferenceKind::Correction,
        ReferenceKind::TransferPair,
        ReferenceKind::WriteOff,
    ];

    /// Returns the stored tag for this reference kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::PurchaseOrder => "PURCHASE_ORDER",
            ReferenceKind::WorkOrder => "WORK_ORDER",
            ReferenceKind::Stocktake => "STOCKTAKE",
            ReferenceKind::Damage => "DAMAGE",
            ReferenceKind::Expiry => "EXPIRY",
            ReferenceKind::Correction => "CORRECTION",
            ReferenceKind::TransferPair => "TRANSFER_PAIR",
            ReferenceKind::WriteOff => "WRITE_OFF",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReferenceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError {
                what: "reference kind",
                value: s.to_string(),
            })
    }
}

/// An immutable, committed ledger entry.
///
/// `qty` is the signed delta applied to the balance's on-hand quantity:
/// positive for stock coming in, negative for stock going out. The sum of
/// `qty` over all entries of a `(warehouse, item)` key equals that key's
/// on-hand quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub kind: TransactionKind,
    pub timestamp: DateTime<Utc>,
    pub qty: Decimal,
    /// Unit cost captured when the entry was written; never looked up again.
    pub unit_cost: Decimal,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl LedgerEntry {
    /// Returns the balance key this entry belongs to.
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.warehouse_id, self.item_id)
    }

    /// Returns the value of the movement (`|qty| × unit_cost`), or None on overflow.
    pub fn value(&self) -> Option<Decimal> {
        line_value(self.qty, self.unit_cost)
    }
}

fn line_value(qty: Decimal, unit_cost: Decimal) -> Option<Decimal> {
    qty.abs().checked_mul(unit_cost)
}

/// A ledger entry staged in a unit of work, not yet committed.
///
/// The store assigns the entry id and timestamp when the unit of work commits.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub kind: TransactionKind,
    pub qty: Decimal,
    pub unit_cost: Decimal,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl NewLedgerEntry {
    /// Creates a staged entry with no reference, notes or attribution.
    pub fn new(key: BalanceKey, kind: TransactionKind, qty: Decimal, unit_cost: Decimal) -> Self {
        Self {
            warehouse_id: key.warehouse_id,
            item_id: key.item_id,
            kind,
            qty,
            unit_cost,
            reference_kind: None,
            reference_id: None,
            notes: None,
            performed_by: None,
        }
    }

    /// Sets the reference kind and optional reference id.
    pub fn reference(mut self, kind: Option<ReferenceKind>, id: Option<String>) -> Self {
        self.reference_kind = kind;
        self.reference_id = id;
        self
    }

    /// Sets free-text notes.
    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Sets the caller identity recorded for attribution.
    pub fn performed_by(mut self, performed_by: Option<String>) -> Self {
        self.performed_by = performed_by;
        self
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.warehouse_id, self.item_id)
    }

    /// Returns the value the entry will carry (`|qty| × unit_cost`), or None on overflow.
    pub fn value(&self) -> Option<Decimal> {
        line_value(self.qty, self.unit_cost)
    }

    /// Seals the staged entry with the id and timestamp assigned at commit.
    pub fn into_entry(self, entry_id: EntryId, timestamp: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            entry_id,
            warehouse_id: self.warehouse_id,
            item_id: self.item_id,
            kind: self.kind,
            timestamp,
            qty: self.qty,
            unit_cost: self.unit_cost,
            reference_kind: self.reference_kind,
            reference_id: self.reference_id,
            notes: self.notes,
            performed_by: self.performed_by,
        }
    }
}
