//! Request shape checks that run before any lookup or storage access.

use common::ItemId;
use ledger::{ReferenceKind, amount_fits};
use rust_decimal::Decimal;

use crate::error::{Result, StockError};

pub fn require_lines<T>(lines: &[T]) -> Result<()> {
    if lines.is_empty() {
        return Err(StockError::NoLines);
    }
    Ok(())
}

/// Reasons an adjustment may carry as its reference kind.
const ADJUSTMENT_TYPES: [ReferenceKind; 4] = [
    ReferenceKind::Correction,
    ReferenceKind::Damage,
    ReferenceKind::Expiry,
    ReferenceKind::Stocktake,
];

/// Rejects quantities the ledger cannot store exactly.
fn require_storable(item_id: ItemId, qty: Decimal) -> Result<()> {
    if !amount_fits(qty) {
        return Err(StockError::InvalidQuantity { item_id, qty });
    }
    Ok(())
}

pub fn require_positive(item_id: ItemId, qty: Decimal) -> Result<()> {
    require_storable(item_id, qty)?;
    if qty <= Decimal::ZERO {
        return Err(StockError::InvalidQuantity { item_id, qty });
    }
    Ok(())
}

pub fn require_non_zero(item_id: ItemId, qty: Decimal) -> Result<()> {
    require_storable(item_id, qty)?;
    if qty.is_zero() {
        return Err(StockError::InvalidQuantity { item_id, qty });
    }
    Ok(())
}

pub fn require_non_negative(item_id: ItemId, qty: Decimal) -> Result<()> {
    require_storable(item_id, qty)?;
    if qty < Decimal::ZERO {
        return Err(StockError::InvalidQuantity { item_id, qty });
    }
    Ok(())
}

pub fn require_unit_cost(item_id: ItemId, unit_cost: Option<Decimal>) -> Result<()> {
    if let Some(unit_cost) = unit_cost
        && (unit_cost < Decimal::ZERO || !amount_fits(unit_cost))
    {
        return Err(StockError::InvalidUnitCost { item_id, unit_cost });
    }
    Ok(())
}

pub fn require_adjustment_type(adjustment_type: ReferenceKind) -> Result<()> {
    if !ADJUSTMENT_TYPES.contains(&adjustment_type) {
        return Err(StockError::InvalidAdjustmentType { adjustment_type });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_line_list_is_rejected() {
        assert!(matches!(
            require_lines::<u8>(&[]),
            Err(StockError::NoLines)
        ));
        assert!(require_lines(&[1]).is_ok());
    }

    #[test]
    fn quantity_rules() {
        let item = ItemId::new();
        assert!(require_positive(item, dec!(0.001)).is_ok());
        assert!(require_positive(item, dec!(0)).is_err());
        assert!(require_positive(item, dec!(-3)).is_err());

        assert!(require_non_zero(item, dec!(-3)).is_ok());
        assert!(require_non_zero(item, dec!(0.000)).is_err());

        assert!(require_non_negative(item, dec!(0)).is_ok());
        assert!(require_non_negative(item, dec!(-0.5)).is_err());
    }

    #[test]
    fn quantities_beyond_stored_precision_are_rejected() {
        let item = ItemId::new();
        assert!(require_positive(item, dec!(0.000001)).is_ok());
        assert!(matches!(
            require_positive(item, dec!(0.0000004)),
            Err(StockError::InvalidQuantity { .. })
        ));
        assert!(require_non_zero(item, dec!(-0.1234567)).is_err());
        assert!(require_non_negative(item, dec!(2.50000001)).is_err());
    }

    #[test]
    fn quantities_beyond_stored_magnitude_are_rejected() {
        let item = ItemId::new();
        assert!(require_positive(item, dec!(99999999999999)).is_ok());
        assert!(require_positive(item, dec!(100000000000000000000)).is_err());
        assert!(require_positive(item, Decimal::MAX).is_err());
        assert!(require_non_zero(item, Decimal::MIN).is_err());
        assert!(matches!(
            require_unit_cost(item, Some(dec!(10000000000))),
            Ok(())
        ));
        assert!(matches!(
            require_unit_cost(item, Some(Decimal::MAX)),
            Err(StockError::InvalidUnitCost { .. })
        ));
        assert!(matches!(
            require_unit_cost(item, Some(dec!(1.0000001))),
            Err(StockError::InvalidUnitCost { .. })
        ));
    }

    #[test]
    fn only_adjustment_reasons_are_adjustment_types() {
        for kind in [
            ReferenceKind::Correction,
            ReferenceKind::Damage,
            ReferenceKind::Expiry,
            ReferenceKind::Stocktake,
        ] {
            assert!(require_adjustment_type(kind).is_ok());
        }
        for kind in [
            ReferenceKind::TransferPair,
            ReferenceKind::PurchaseOrder,
            ReferenceKind::WorkOrder,
            ReferenceKind::WriteOff,
        ] {
            assert!(matches!(
                require_adjustment_type(kind),
                Err(StockError::InvalidAdjustmentType { .. })
            ));
        }
    }

    #[test]
    fn negative_unit_cost_is_rejected() {
        let item = ItemId::new();
        assert!(require_unit_cost(item, None).is_ok());
        assert!(require_unit_cost(item, Some(dec!(0))).is_ok());
        assert!(matches!(
            require_unit_cost(item, Some(dec!(-1))),
            Err(StockError::InvalidUnitCost { .. })
        ));
    }
}
