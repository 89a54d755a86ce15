use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BalanceKey, ItemId, Result, StoreError, WarehouseId};

/// Current stock position of one item in one warehouse.
///
/// A balance row is created the first time stock lands in a warehouse and
/// is never removed; a zero balance is a valid terminal state. Derived
/// values such as [`available_qty`] are computed on read and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBalance {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub on_hand_qty: Decimal,
    pub reserved_qty: Decimal,
    pub reorder_level: Option<Decimal>,
    pub last_counted_at: Option<DateTime<Utc>>,
}

impl StockBalance {
    /// Creates an empty balance for a key that has never held stock.
    pub fn empty(key: BalanceKey) -> Self {
        Self {
            warehouse_id: key.warehouse_id,
            item_id: key.item_id,
            on_hand_qty: Decimal::ZERO,
            reserved_qty: Decimal::ZERO,
            reorder_level: None,
            last_counted_at: None,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.warehouse_id, self.item_id)
    }

    pub fn available_qty(&self) -> Decimal {
        available_qty(self)
    }

    pub fn needs_reorder(&self) -> bool {
        needs_reorder(self)
    }

    /// Checks the write-time invariants: neither on-hand nor reserved may be
    /// negative. Violations are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if self.on_hand_qty < Decimal::ZERO || self.reserved_qty < Decimal::ZERO {
            return Err(StoreError::NegativeBalance {
                key: self.key(),
                on_hand: self.on_hand_qty,
                reserved: self.reserved_qty,
            });
        }
        Ok(())
    }
}

/// Fractional digits stored for quantities and costs (`NUMERIC(20, 6)`).
pub const AMOUNT_SCALE: u32 = 6;

/// Integer digits stored for quantities and costs (`NUMERIC(20, 6)`).
pub const AMOUNT_INTEGER_DIGITS: u32 = 14;

/// True when an amount is stored exactly: at most [`AMOUNT_SCALE`] fractional
/// digits and fewer than [`AMOUNT_INTEGER_DIGITS`] integer digits.
///
/// Amounts outside this range would be rounded or refused by the database,
/// so they are rejected before any arithmetic on them.
pub fn amount_fits(amount: Decimal) -> bool {
    let limit = Decimal::from(10i64.pow(AMOUNT_INTEGER_DIGITS));
    amount.normalize().scale() <= AMOUNT_SCALE && amount.abs() < limit
}

/// Quantity that can be issued or transferred: on-hand minus reserved.
///
/// May be negative when a write-off has consumed reserved stock.
pub fn available_qty(balance: &StockBalance) -> Decimal {
    balance.on_hand_qty - balance.reserved_qty
}

/// True when a reorder level is set and available stock is at or below it.
pub fn needs_reorder(balance: &StockBalance) -> bool {
    balance
        .reorder_level
        .is_some_and(|level| available_qty(balance) <= level)
}
