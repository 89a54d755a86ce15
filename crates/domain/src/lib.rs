//! Stock transaction processing for the inventory ledger.
//!
//! This crate provides:
//! - `TransactionProcessor` for receipts, issues, transfers, adjustments,
//!   write-offs and stocktakes, each committed atomically
//! - `QueryService` for balances, low-stock detection and ledger history
//! - Catalog and warehouse lookup ports with in-memory implementations
//! - The `StockError` taxonomy shared by every operation

pub mod error;
pub mod lookup;
pub mod posting;
pub mod processor;
pub mod query;
pub mod request;
pub mod result;
mod validation;

pub use error::{ErrorKind, Result, StockError, UnavailableReason};
pub use lookup::{
    CatalogLookup, InMemoryCatalog, InMemoryWarehouses, Item, LookupError, Warehouse,
    WarehouseLookup,
};
pub use posting::{PlannedLine, Posting};
pub use processor::{DEFAULT_MAX_ATTEMPTS, ProcessorConfig, TransactionProcessor};
pub use query::{QueryService, Reconciliation};
pub use request::{
    AdjustLine, AdjustRequest, CountLine, IssueRequest, ReceiveLine, ReceiveRequest, StockLine,
    StocktakeRequest, TransferRequest, WriteOffRequest,
};
pub use result::{LineResult, TransferResult};
