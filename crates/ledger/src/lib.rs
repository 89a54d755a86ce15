//! Stock ledger storage.
//!
//! This crate owns the two pieces of state the stock engine persists:
//! - [`LedgerEntry`]: the append-only history of every stock movement
//! - [`StockBalance`]: the per-`(warehouse, item)` quantity, a materialized
//!   view of the ledger
//!
//! Writes go through a [`UnitOfWork`] opened by [`StockStore::begin`], which
//! locks the balance keys it will touch and commits ledger entries and
//! balance rows together or not at all.

pub mod balance;
pub mod entry;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use balance::{
    AMOUNT_INTEGER_DIGITS, AMOUNT_SCALE, StockBalance, amount_fits, available_qty, needs_reorder,
};
pub use common::{BalanceKey, ItemId, WarehouseId};
pub use entry::{EntryId, LedgerEntry, NewLedgerEntry, ReferenceKind, TransactionKind};
pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use query::{LedgerQuery, LedgerSortBy, Page, SortOrder};
pub use store::{BalanceStore, LedgerStore, StockStore, UnitOfWork, WorkBuffer};
