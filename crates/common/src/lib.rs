//! Identifiers shared by every crate in the stock ledger workspace.

mod types;

pub use types::{BalanceKey, ItemId, WarehouseId};
