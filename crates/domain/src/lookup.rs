//! Catalog and warehouse lookups the processor depends on.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{ItemId, WarehouseId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A catalog item as seen by the stock ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub standard_unit_cost: Decimal,
}

impl Item {
    pub fn new(item_id: ItemId, standard_unit_cost: Decimal) -> Self {
        Self {
            item_id,
            standard_unit_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub warehouse_id: WarehouseId,
    pub is_active: bool,
}

impl Warehouse {
    pub fn active(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            is_active: true,
        }
    }

    pub fn inactive(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            is_active: false,
        }
    }
}

/// A lookup could not be answered.
#[derive(Debug, Clone, Error)]
#[error("{service} lookup failed: {message}")]
pub struct LookupError {
    pub service: &'static str,
    pub message: String,
}

/// Read-only access to the item catalog.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Returns the item, or None if the catalog does not know it.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, LookupError>;
}

/// Read-only access to warehouse master data.
#[async_trait]
pub trait WarehouseLookup: Send + Sync {
    async fn get_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Option<Warehouse>, LookupError>;
}

#[derive(Debug, Default)]
struct CatalogState {
    items: HashMap<ItemId, Item>,
    unavailable: bool,
}

/// In-memory catalog, used by the service when no catalog is wired and in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: Item) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.items.insert(item.item_id, item);
    }

    /// Makes every subsequent lookup fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Item> for InMemoryCatalog {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let catalog = Self::new();
        for item in iter {
            catalog.insert(item);
        }
        catalog
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, LookupError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(LookupError {
                service: "catalog",
                message: "catalog is unavailable".to_string(),
            });
        }
        Ok(state.items.get(&item_id).cloned())
    }
}

#[derive(Debug, Default)]
struct WarehouseState {
    warehouses: HashMap<WarehouseId, Warehouse>,
    unavailable: bool,
}

/// In-memory warehouse directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouses {
    state: Arc<RwLock<WarehouseState>>,
}

impl InMemoryWarehouses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, warehouse: Warehouse) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.warehouses.insert(warehouse.warehouse_id, warehouse);
    }

    /// Makes every subsequent lookup fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .warehouses
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Warehouse> for InMemoryWarehouses {
    fn from_iter<T: IntoIterator<Item = Warehouse>>(iter: T) -> Self {
        let warehouses = Self::new();
        for warehouse in iter {
            warehouses.insert(warehouse);
        }
        warehouses
    }
}

#[async_trait]
impl WarehouseLookup for InMemoryWarehouses {
    async fn get_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Option<Warehouse>, LookupError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(LookupError {
                service: "warehouse",
                message: "warehouse directory is unavailable".to_string(),
            });
        }
        Ok(state.warehouses.get(&warehouse_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn catalog_returns_inserted_items() {
        let item = Item::new(ItemId::new(), dec!(15.75));
        let catalog: InMemoryCatalog = [item.clone()].into_iter().collect();

        assert_eq!(catalog.get_item(item.item_id).await.unwrap(), Some(item));
        assert_eq!(catalog.get_item(ItemId::new()).await.unwrap(), None);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_catalog_fails_lookups() {
        let catalog = InMemoryCatalog::new();
        catalog.set_unavailable(true);
        let err = catalog.get_item(ItemId::new()).await.unwrap_err();
        assert_eq!(err.service, "catalog");

        catalog.set_unavailable(false);
        assert!(catalog.get_item(ItemId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn warehouses_report_activity() {
        let active = WarehouseId::new();
        let closed = WarehouseId::new();
        let warehouses: InMemoryWarehouses =
            [Warehouse::active(active), Warehouse::inactive(closed)]
                .into_iter()
                .collect();

        assert!(warehouses.get_warehouse(active).await.unwrap().unwrap().is_active);
        assert!(!warehouses.get_warehouse(closed).await.unwrap().unwrap().is_active);
        assert!(warehouses.get_warehouse(WarehouseId::new()).await.unwrap().is_none());
    }
}
