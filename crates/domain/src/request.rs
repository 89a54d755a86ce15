//! Transaction requests accepted by the processor.

use common::{ItemId, WarehouseId};
use ledger::ReferenceKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A receipt line. Without a unit cost the item's standard cost is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveLine {
    pub item_id: ItemId,
    pub qty: Decimal,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
}

impl ReceiveLine {
    pub fn new(item_id: ItemId, qty: Decimal) -> Self {
        Self {
            item_id,
            qty,
            unit_cost: None,
        }
    }

    pub fn at_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }
}

/// An issue or transfer line; `qty` must be positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    pub item_id: ItemId,
    pub qty: Decimal,
}

impl StockLine {
    pub fn new(item_id: ItemId, qty: Decimal) -> Self {
        Self { item_id, qty }
    }
}

/// An adjustment line; `qty_adjustment` is signed and non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustLine {
    pub item_id: ItemId,
    pub qty_adjustment: Decimal,
}

impl AdjustLine {
    pub fn new(item_id: ItemId, qty_adjustment: Decimal) -> Self {
        Self {
            item_id,
            qty_adjustment,
        }
    }
}

/// A stocktake line with the physically counted quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountLine {
    pub item_id: ItemId,
    pub counted_qty: Decimal,
}

impl CountLine {
    pub fn new(item_id: ItemId, counted_qty: Decimal) -> Self {
        Self {
            item_id,
            counted_qty,
        }
    }
}

/// Adds the free-text notes and attribution setters shared by every request.
macro_rules! attributed {
    ($request:ty) => {
        impl $request {
            pub fn notes(mut self, notes: impl Into<String>) -> Self {
                self.notes = Some(notes.into());
                self
            }

            pub fn performed_by(mut self, performed_by: impl Into<String>) -> Self {
                self.performed_by = Some(performed_by.into());
                self
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRequest {
    pub warehouse_id: WarehouseId,
    pub lines: Vec<ReceiveLine>,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl ReceiveRequest {
    pub fn new(warehouse_id: WarehouseId, lines: Vec<ReceiveLine>) -> Self {
        Self {
            warehouse_id,
            lines,
            reference_kind: None,
            reference_id: None,
            notes: None,
            performed_by: None,
        }
    }

    pub fn reference(mut self, kind: ReferenceKind, id: Option<String>) -> Self {
        self.reference_kind = Some(kind);
        self.reference_id = id;
        self
    }
}

attributed!(ReceiveRequest);

#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub warehouse_id: WarehouseId,
    pub lines: Vec<StockLine>,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl IssueRequest {
    pub fn new(warehouse_id: WarehouseId, lines: Vec<StockLine>) -> Self {
        Self {
            warehouse_id,
            lines,
            reference_kind: None,
            reference_id: None,
            notes: None,
            performed_by: None,
        }
    }

    pub fn reference(mut self, kind: ReferenceKind, id: Option<String>) -> Self {
        self.reference_kind = Some(kind);
        self.reference_id = id;
        self
    }
}

attributed!(IssueRequest);

/// Moves stock between two warehouses. Each line becomes a pair of entries.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub lines: Vec<StockLine>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl TransferRequest {
    pub fn new(
        from_warehouse_id: WarehouseId,
        to_warehouse_id: WarehouseId,
        lines: Vec<StockLine>,
    ) -> Self {
        Self {
            from_warehouse_id,
            to_warehouse_id,
            lines,
            notes: None,
            performed_by: None,
        }
    }
}

attributed!(TransferRequest);

/// Signed corrections to on-hand stock.
///
/// `adjustment_type` is recorded as the entries' reference kind, typically
/// `CORRECTION`, `DAMAGE`, `EXPIRY` or `STOCKTAKE`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustRequest {
    pub warehouse_id: WarehouseId,
    pub lines: Vec<AdjustLine>,
    pub adjustment_type: ReferenceKind,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl AdjustRequest {
    pub fn new(
        warehouse_id: WarehouseId,
        lines: Vec<AdjustLine>,
        adjustment_type: ReferenceKind,
    ) -> Self {
        Self {
            warehouse_id,
            lines,
            adjustment_type,
            reference_id: None,
            notes: None,
            performed_by: None,
        }
    }

    pub fn reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self
    }
}

attributed!(AdjustRequest);

/// Removes damaged or expired stock. The reason is kept as the entry's notes.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOffRequest {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub qty: Decimal,
    pub reason: String,
    pub performed_by: Option<String>,
}

impl WriteOffRequest {
    pub fn new(
        warehouse_id: WarehouseId,
        item_id: ItemId,
        qty: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            warehouse_id,
            item_id,
            qty,
            reason: reason.into(),
            performed_by: None,
        }
    }

    pub fn performed_by(mut self, performed_by: impl Into<String>) -> Self {
        self.performed_by = Some(performed_by.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StocktakeRequest {
    pub warehouse_id: WarehouseId,
    pub lines: Vec<CountLine>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl StocktakeRequest {
    pub fn new(warehouse_id: WarehouseId, lines: Vec<CountLine>) -> Self {
        Self {
            warehouse_id,
            lines,
            reference_id: None,
            notes: None,
            performed_by: None,
        }
    }

    pub fn reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self
    }
}

attributed!(StocktakeRequest);
