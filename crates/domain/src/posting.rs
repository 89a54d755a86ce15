//! In-memory plan of the balance changes and entries one request makes.
//!
//! A [`Posting`] is filled from the balances read under lock, mutated by a
//! pure planning function, and only then staged into the unit of work. It
//! enforces the balance rules every operation shares: issues are checked
//! against available stock, and no posting may leave on-hand negative.

use std::collections::BTreeMap;

use common::BalanceKey;
use ledger::{NewLedgerEntry, StockBalance, amount_fits};
use rust_decimal::Decimal;

use crate::error::{Result, StockError};

/// A ledger entry planned by a posting, with the on-hand it moved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLine {
    pub entry: NewLedgerEntry,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    /// `|qty| × unit_cost`, computed while planning so commit never does arithmetic.
    pub total_value: Decimal,
}

#[derive(Debug, Clone)]
struct Slot {
    balance: Option<StockBalance>,
    touched: bool,
}

/// Working copy of the locked balances plus the entries planned against them.
#[derive(Debug, Clone, Default)]
pub struct Posting {
    slots: BTreeMap<BalanceKey, Slot>,
    lines: Vec<PlannedLine>,
}

impl Posting {
    /// Starts a posting from the balances read for each locked key.
    pub fn new(balances: impl IntoIterator<Item = (BalanceKey, Option<StockBalance>)>) -> Self {
        Self {
            slots: balances
                .into_iter()
                .map(|(key, balance)| {
                    (
                        key,
                        Slot {
                            balance,
                            touched: false,
                        },
                    )
                })
                .collect(),
            lines: Vec::new(),
        }
    }

    /// Returns the current planned balance for a key, if a row exists.
    pub fn balance(&self, key: BalanceKey) -> Option<&StockBalance> {
        self.slots.get(&key).and_then(|slot| slot.balance.as_ref())
    }

    /// Returns the balance for a key, failing when the warehouse holds no row for the item.
    pub fn existing(&self, key: BalanceKey) -> Result<&StockBalance> {
        self.balance(key).ok_or(StockError::BalanceNotFound {
            warehouse_id: key.warehouse_id,
            item_id: key.item_id,
        })
    }

    /// Checks that `qty` can be taken from available stock.
    pub fn require_available(&self, key: BalanceKey, qty: Decimal) -> Result<()> {
        let available = self.existing(key)?.available_qty();
        if available < qty {
            return Err(StockError::InsufficientStock {
                warehouse_id: key.warehouse_id,
                item_id: key.item_id,
                available,
                requested: qty,
            });
        }
        Ok(())
    }

    /// Checks that `qty` can be taken from on-hand stock, ignoring reservations.
    pub fn require_on_hand(&self, key: BalanceKey, qty: Decimal) -> Result<()> {
        let on_hand = self.existing(key)?.on_hand_qty;
        if on_hand < qty {
            return Err(StockError::InsufficientStock {
                warehouse_id: key.warehouse_id,
                item_id: key.item_id,
                available: on_hand,
                requested: qty,
            });
        }
        Ok(())
    }

    /// Plans an entry and applies its quantity to the key's on-hand.
    ///
    /// Creates the balance at zero when the key has no row yet.
    pub fn post(&mut self, entry: NewLedgerEntry) -> Result<&PlannedLine> {
        let key = entry.key();
        let total_value = entry.value().ok_or(StockError::ValueOutOfRange {
            item_id: key.item_id,
            qty: entry.qty,
            unit_cost: entry.unit_cost,
        })?;
        let slot = self.slot_mut(key)?;
        let balance = slot.balance.get_or_insert_with(|| StockBalance::empty(key));

        let balance_before = balance.on_hand_qty;
        let balance_after = balance_before
            .checked_add(entry.qty)
            .filter(|after| amount_fits(*after))
            .ok_or(StockError::BalanceOutOfRange {
                warehouse_id: key.warehouse_id,
                item_id: key.item_id,
                on_hand: balance_before,
                delta: entry.qty,
            })?;
        if balance_after < Decimal::ZERO {
            return Err(StockError::NegativeStockViolation {
                warehouse_id: key.warehouse_id,
                item_id: key.item_id,
                on_hand: balance_before,
                delta: entry.qty,
            });
        }

        balance.on_hand_qty = balance_after;
        slot.touched = true;
        self.lines.push(PlannedLine {
            entry,
            balance_before,
            balance_after,
            total_value,
        });
        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Replaces a balance without planning an entry. On-hand must not change.
    pub fn update(&mut self, balance: StockBalance) -> Result<()> {
        let slot = self.slot_mut(balance.key())?;
        slot.balance = Some(balance);
        slot.touched = true;
        Ok(())
    }

    pub fn lines(&self) -> &[PlannedLine] {
        &self.lines
    }

    /// Splits the posting into the balances it changed and its planned lines.
    pub fn into_parts(self) -> (Vec<StockBalance>, Vec<PlannedLine>) {
        let balances = self
            .slots
            .into_values()
            .filter(|slot| slot.touched)
            .filter_map(|slot| slot.balance)
            .collect();
        (balances, self.lines)
    }

    fn slot_mut(&mut self, key: BalanceKey) -> Result<&mut Slot> {
        self.slots
            .get_mut(&key)
            .ok_or(StockError::Store(ledger::StoreError::KeyNotLocked(key)))
    }
}
