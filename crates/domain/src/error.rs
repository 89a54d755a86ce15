//! Domain error types.

use common::{ItemId, WarehouseId};
use ledger::{ReferenceKind, StoreError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a warehouse cannot take part in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    NotFound,
    Inactive,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::NotFound => write!(f, "not found"),
            UnavailableReason::Inactive => write!(f, "inactive"),
        }
    }
}

/// Coarse classification of a [`StockError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    WarehouseUnavailable,
    ItemNotFound,
    InvalidQuantity,
    InsufficientStock,
    NegativeStockViolation,
    InvalidTransfer,
    ConcurrentModification,
    DependencyUnavailable,
    InvalidQuery,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::WarehouseUnavailable => "WarehouseUnavailable",
            ErrorKind::ItemNotFound => "ItemNotFound",
            ErrorKind::InvalidQuantity => "InvalidQuantity",
            ErrorKind::InsufficientStock => "InsufficientStock",
            ErrorKind::NegativeStockViolation => "NegativeStockViolation",
            ErrorKind::InvalidTransfer => "InvalidTransfer",
            ErrorKind::ConcurrentModification => "ConcurrentModification",
            ErrorKind::DependencyUnavailable => "DependencyUnavailable",
            ErrorKind::InvalidQuery => "InvalidQuery",
            ErrorKind::Storage => "Storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while processing stock transactions.
///
/// Every error aborts the whole request; nothing is committed.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Warehouse {warehouse_id} is unavailable: {reason}")]
    WarehouseUnavailable {
        warehouse_id: WarehouseId,
        reason: UnavailableReason,
    },

    /// The item is missing from the catalog.
    #[error("Item {item_id} not found in catalog")]
    ItemNotFound { item_id: ItemId },

    /// The item is known but has no balance in this warehouse.
    #[error("Item {item_id} has no stock balance in warehouse {warehouse_id}")]
    BalanceNotFound {
        warehouse_id: WarehouseId,
        item_id: ItemId,
    },

    #[error("Request has no lines")]
    NoLines,

    #[error("Invalid quantity {qty} for item {item_id}")]
    InvalidQuantity { item_id: ItemId, qty: Decimal },

    #[error("Invalid unit cost {unit_cost} for item {item_id}")]
    InvalidUnitCost { item_id: ItemId, unit_cost: Decimal },

    #[error("{adjustment_type} is not an adjustment type")]
    InvalidAdjustmentType { adjustment_type: ReferenceKind },

    /// Applying the movement would take on-hand past the largest storable amount.
    #[error(
        "Moving item {item_id} in warehouse {warehouse_id} by {delta} would take on-hand {on_hand} out of range"
    )]
    BalanceOutOfRange {
        warehouse_id: WarehouseId,
        item_id: ItemId,
        on_hand: Decimal,
        delta: Decimal,
    },

    #[error("Value of {qty} at {unit_cost} for item {item_id} is out of range")]
    ValueOutOfRange {
        item_id: ItemId,
        qty: Decimal,
        unit_cost: Decimal,
    },

    #[error("Cannot transfer from warehouse {warehouse_id} to itself")]
    InvalidTransfer { warehouse_id: WarehouseId },

    #[error(
        "Insufficient stock of item {item_id} in warehouse {warehouse_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        warehouse_id: WarehouseId,
        item_id: ItemId,
        available: Decimal,
        requested: Decimal,
    },

    #[error(
        "Adjusting item {item_id} in warehouse {warehouse_id} by {delta} would leave on-hand {on_hand} negative"
    )]
    NegativeStockViolation {
        warehouse_id: WarehouseId,
        item_id: ItemId,
        on_hand: Decimal,
        delta: Decimal,
    },

    #[error(
        "Reserved quantity {reserved} exceeds on-hand {on_hand} for item {item_id} in warehouse {warehouse_id}"
    )]
    ReservationExceedsOnHand {
        warehouse_id: WarehouseId,
        item_id: ItemId,
        on_hand: Decimal,
        reserved: Decimal,
    },

    #[error("Concurrent modification: gave up after {attempts} attempts")]
    ConcurrentModification { attempts: u32 },

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl StockError {
    /// Classifies the error into its taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StockError::WarehouseUnavailable { .. } => ErrorKind::WarehouseUnavailable,
            StockError::ItemNotFound { .. } | StockError::BalanceNotFound { .. } => {
                ErrorKind::ItemNotFound
            }
            StockError::NoLines
            | StockError::InvalidQuantity { .. }
            | StockError::InvalidUnitCost { .. }
            | StockError::InvalidAdjustmentType { .. }
            | StockError::BalanceOutOfRange { .. }
            | StockError::ValueOutOfRange { .. }
            | StockError::ReservationExceedsOnHand { .. } => ErrorKind::InvalidQuantity,
            StockError::InvalidTransfer { .. } => ErrorKind::InvalidTransfer,
            StockError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            StockError::NegativeStockViolation { .. } => ErrorKind::NegativeStockViolation,
            StockError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            StockError::DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
            StockError::Store(StoreError::NegativeBalance { .. }) => {
                ErrorKind::NegativeStockViolation
            }
            StockError::Store(StoreError::InvalidQuery(_)) => ErrorKind::InvalidQuery,
            StockError::Store(StoreError::LockTimeout { .. } | StoreError::Conflict(_)) => {
                ErrorKind::ConcurrentModification
            }
            StockError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrentModification | ErrorKind::DependencyUnavailable
        )
    }
}

/// Result type for stock operations.
pub type Result<T> = std::result::Result<T, StockError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::BalanceKey;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_absence_is_item_not_found() {
        let err = StockError::BalanceNotFound {
            warehouse_id: WarehouseId::new(),
            item_id: ItemId::new(),
        };
        assert_eq!(err.kind(), ErrorKind::ItemNotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn store_errors_classify_by_cause() {
        let key = BalanceKey::new(WarehouseId::new(), ItemId::new());
        let negative = StockError::from(StoreError::NegativeBalance {
            key,
            on_hand: dec!(-1),
            reserved: dec!(0),
        });
        assert_eq!(negative.kind(), ErrorKind::NegativeStockViolation);

        let timeout = StockError::from(StoreError::LockTimeout { key, waited_ms: 5 });
        assert_eq!(timeout.kind(), ErrorKind::ConcurrentModification);
        assert!(timeout.is_retryable());

        let query = StockError::from(StoreError::InvalidQuery("page".into()));
        assert_eq!(query.kind(), ErrorKind::InvalidQuery);
    }

    #[test]
    fn out_of_range_amounts_are_invalid_quantities() {
        let overflow = StockError::BalanceOutOfRange {
            warehouse_id: WarehouseId::new(),
            item_id: ItemId::new(),
            on_hand: dec!(99999999999999),
            delta: dec!(1),
        };
        assert_eq!(overflow.kind(), ErrorKind::InvalidQuantity);

        let adjustment = StockError::InvalidAdjustmentType {
            adjustment_type: ReferenceKind::TransferPair,
        };
        assert_eq!(adjustment.kind(), ErrorKind::InvalidQuantity);
        assert!(!adjustment.is_retryable());
    }

    #[test]
    fn dependency_failures_are_retryable() {
        assert!(StockError::DependencyUnavailable("catalog".into()).is_retryable());
        assert!(StockError::ConcurrentModification { attempts: 3 }.is_retryable());
        assert!(
            !StockError::InvalidTransfer {
                warehouse_id: WarehouseId::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn insufficient_stock_message_names_quantities() {
        let err = StockError::InsufficientStock {
            warehouse_id: WarehouseId::new(),
            item_id: ItemId::new(),
            available: dec!(70),
            requested: dec!(1000),
        };
        let message = err.to_string();
        assert!(message.contains("available 70"));
        assert!(message.contains("requested 1000"));
    }
}
