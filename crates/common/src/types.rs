use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a UUID-backed identifier newtype.
///
/// Each identifier wraps a UUID so that warehouse and item ids cannot be
/// swapped by accident at a call site.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a warehouse in the external warehouse registry.
    WarehouseId
);

uuid_id!(
    /// Identifier of an item in the external catalog.
    ItemId
);

/// Composite identity of a stock balance: one row per `(warehouse, item)`.
///
/// The derived ordering (warehouse first, then item) is the global lock
/// order. Any code that locks more than one balance must acquire the keys
/// in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
}

impl BalanceKey {
    pub fn new(warehouse_id: WarehouseId, item_id: ItemId) -> Self {
        Self {
            warehouse_id,
            item_id,
        }
    }

    /// Sorts and deduplicates keys into lock acquisition order.
    pub fn lock_order(keys: impl IntoIterator<Item = BalanceKey>) -> Vec<BalanceKey> {
        let mut keys: Vec<_> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl std::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.warehouse_id, self.item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warehouse_id_new_creates_unique_ids() {
        let id1 = WarehouseId::new();
        let id2 = WarehouseId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn item_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = ItemId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn ids_parse_from_their_display_form() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<WarehouseId>().is_err());
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&WarehouseId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn lock_order_sorts_by_warehouse_then_item() {
        let w_low = WarehouseId::from_uuid(Uuid::from_u128(1));
        let w_high = WarehouseId::from_uuid(Uuid::from_u128(2));
        let i_low = ItemId::from_uuid(Uuid::from_u128(10));
        let i_high = ItemId::from_uuid(Uuid::from_u128(20));

        let ordered = BalanceKey::lock_order([
            BalanceKey::new(w_high, i_low),
            BalanceKey::new(w_low, i_high),
            BalanceKey::new(w_low, i_low),
            BalanceKey::new(w_low, i_high),
        ]);

        assert_eq!(
            ordered,
            vec![
                BalanceKey::new(w_low, i_low),
                BalanceKey::new(w_low, i_high),
                BalanceKey::new(w_high, i_low),
            ]
        );
    }

    #[test]
    fn reverse_transfers_lock_in_the_same_order() {
        let a = WarehouseId::new();
        let b = WarehouseId::new();
        let item = ItemId::new();

        let forward = BalanceKey::lock_order([BalanceKey::new(a, item), BalanceKey::new(b, item)]);
        let reverse = BalanceKey::lock_order([BalanceKey::new(b, item), BalanceKey::new(a, item)]);
        assert_eq!(forward, reverse);
    }
}
