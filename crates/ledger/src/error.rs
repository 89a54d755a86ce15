use rust_decimal::Decimal;
use thiserror::Error;

use crate::BalanceKey;

/// Errors that can occur when interacting with the stock store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A balance key lock could not be acquired within the configured timeout.
    #[error("Lock on balance {key} not acquired within {waited_ms}ms")]
    LockTimeout { key: BalanceKey, waited_ms: u64 },

    /// The database aborted the unit of work because of contention
    /// (lock timeout, deadlock or serialization failure).
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// A write would leave a balance with negative on-hand or reserved stock.
    #[error("Balance {key} would become negative: on hand {on_hand}, reserved {reserved}")]
    NegativeBalance {
        key: BalanceKey,
        on_hand: Decimal,
        reserved: Decimal,
    },

    /// The unit of work tried to read or write a key it did not lock.
    #[error("Balance {0} is not locked by this unit of work")]
    KeyNotLocked(BalanceKey),

    /// The ledger query is malformed.
    #[error("Invalid ledger query: {0}")]
    InvalidQuery(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. } | StoreError::Conflict(_))
    }
}

/// Result type for stock store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
