use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    BalanceKey, LedgerEntry, LedgerQuery, NewLedgerEntry, Page, Result, StockBalance, StoreError,
    WarehouseId,
};

/// Read access to stock balances.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Returns the committed balance for a key, or None if the key has never held stock.
    async fn get_balance(&self, key: BalanceKey) -> Result<Option<StockBalance>>;

    /// Lists committed balances, optionally restricted to one warehouse.
    ///
    /// Balances are returned in key order.
    async fn list_balances(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<StockBalance>>;
}

/// Read access to the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Retrieves one page of entries matching a query.
    async fn query_entries(&self, query: LedgerQuery) -> Result<Page<LedgerEntry>>;

    /// Sums the signed quantity of every entry for a key.
    async fn sum_qty(&self, key: BalanceKey) -> Result<Decimal>;
}

/// An open, all-or-nothing write against the stock store.
///
/// A unit of work holds the locks for the keys it was opened with until it
/// commits, rolls back, or is dropped. Dropping it without committing
/// discards every staged change.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Keys locked by this unit of work, in lock order.
    fn locked_keys(&self) -> &[BalanceKey];

    /// Reads a balance, seeing this unit of work's own staged writes.
    async fn load_balance(&mut self, key: BalanceKey) -> Result<Option<StockBalance>>;

    /// Stages a balance write. Rejects negative quantities.
    fn stage_balance(&mut self, balance: StockBalance) -> Result<()>;

    /// Stages a ledger entry for append.
    fn stage_entry(&mut self, entry: NewLedgerEntry) -> Result<()>;

    /// Atomically appends the staged entries and writes the staged balances.
    ///
    /// Returns the committed entries in staging order.
    async fn commit(self) -> Result<Vec<LedgerEntry>>;

    /// Discards staged changes and releases the locks.
    async fn rollback(self) -> Result<()>;
}

/// A store that can open units of work over balances and the ledger.
#[async_trait]
pub trait StockStore: BalanceStore + LedgerStore {
    type Work: UnitOfWork;

    /// Opens a unit of work holding exclusive locks on `keys`.
    ///
    /// Keys are locked in ascending [`BalanceKey`] order whatever order they
    /// are passed in. Waiting for a lock is bounded; on timeout the store
    /// returns a conflict error and holds no locks.
    async fn begin(&self, keys: &[BalanceKey]) -> Result<Self::Work>;
}

/// Staging area shared by the unit-of-work implementations.
///
/// Tracks which keys are locked and buffers balance writes and ledger
/// entries until commit.
#[derive(Debug, Default)]
pub struct WorkBuffer {
    keys: Vec<BalanceKey>,
    balances: BTreeMap<BalanceKey, StockBalance>,
    entries: Vec<NewLedgerEntry>,
}

impl WorkBuffer {
    pub fn new(keys: Vec<BalanceKey>) -> Self {
        Self {
            keys: BalanceKey::lock_order(keys),
            balances: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn keys(&self) -> &[BalanceKey] {
        &self.keys
    }

    pub fn require_locked(&self, key: BalanceKey) -> Result<()> {
        if self.keys.binary_search(&key).is_ok() {
            Ok(())
        } else {
            Err(StoreError::KeyNotLocked(key))
        }
    }

    /// Returns the staged write for a key, if any.
    pub fn staged_balance(&self, key: BalanceKey) -> Option<&StockBalance> {
        self.balances.get(&key)
    }

    pub fn stage_balance(&mut self, balance: StockBalance) -> Result<()> {
        self.require_locked(balance.key())?;
        balance.validate()?;
        self.balances.insert(balance.key(), balance);
        Ok(())
    }

    pub fn stage_entry(&mut self, entry: NewLedgerEntry) -> Result<()> {
        self.require_locked(entry.key())?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.entries.is_empty()
    }

    /// Splits the buffer into staged balances and entries for commit.
    pub fn into_parts(self) -> (Vec<StockBalance>, Vec<NewLedgerEntry>) {
        (self.balances.into_values().collect(), self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ItemId, TransactionKind};
    use rust_decimal_macros::dec;

    #[test]
    fn buffer_rejects_unlocked_keys() {
        let locked = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let other = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let mut buffer = WorkBuffer::new(vec![locked]);

        assert!(buffer.stage_balance(StockBalance::empty(locked)).is_ok());
        assert!(matches!(
            buffer.stage_balance(StockBalance::empty(other)),
            Err(StoreError::KeyNotLocked(_))
        ));
        assert!(matches!(
            buffer.stage_entry(NewLedgerEntry::new(
                other,
                TransactionKind::Receive,
                dec!(1),
                dec!(1)
            )),
            Err(StoreError::KeyNotLocked(_))
        ));
    }

    #[test]
    fn buffer_rejects_negative_balances() {
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let mut buffer = WorkBuffer::new(vec![key]);
        let mut balance = StockBalance::empty(key);
        balance.on_hand_qty = dec!(-1);

        assert!(matches!(
            buffer.stage_balance(balance),
            Err(StoreError::NegativeBalance { .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn later_balance_write_replaces_earlier() {
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let mut buffer = WorkBuffer::new(vec![key]);
        let mut balance = StockBalance::empty(key);
        balance.on_hand_qty = dec!(5);
        buffer.stage_balance(balance.clone()).unwrap();
        balance.on_hand_qty = dec!(8);
        buffer.stage_balance(balance).unwrap();

        assert_eq!(buffer.staged_balance(key).unwrap().on_hand_qty, dec!(8));
        let (balances, entries) = buffer.into_parts();
        assert_eq!(balances.len(), 1);
        assert!(entries.is_empty());
    }
}
