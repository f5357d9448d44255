use chrono::{DateTime, Utc};
use common::{FarmerId, HarvestId, InvoiceId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{HarvestState, RegistryError, Result, farmer::required};

/// A harvest delivered by a farmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Harvest {
    pub id: HarvestId,
    pub farmer_id: FarmerId,
    pub product: String,
    /// Tons; always greater than zero.
    pub quantity: Decimal,
    pub state: HarvestState,
    pub created_at: DateTime<Utc>,
    /// Set once billing reports the invoice.
    pub invoice_id: Option<InvoiceId>,
}

impl Harvest {
    /// Creates a harvest in the `Registered` state.
    pub fn new(farmer_id: FarmerId, product: &str, quantity: Decimal) -> Result<Self> {
        Ok(Self {
            id: HarvestId::new(),
            farmer_id,
            product: validate_product(product)?,
            quantity: validate_quantity(quantity)?,
            state: HarvestState::Registered,
            created_at: Utc::now(),
            invoice_id: None,
        })
    }
}

/// Request to register a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHarvest {
    pub farmer_id: FarmerId,
    pub product: String,
    pub quantity: Decimal,
}

/// Full update of a harvest.
///
/// A `state` other than the current one goes through the same transition
/// rules as a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestUpdate {
    pub product: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub state: Option<String>,
}

pub(crate) fn validate_product(product: &str) -> Result<String> {
    required("product", product, 50)
}

pub(crate) fn validate_quantity(quantity: Decimal) -> Result<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(RegistryError::InvalidQuantity(quantity));
    }
    if !contracts::quantity_in_range(quantity) {
        return Err(RegistryError::QuantityOutOfRange(quantity));
    }
    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_harvest_starts_registered() {
        let harvest = Harvest::new(FarmerId::new(), "ARROZ", Decimal::from(10)).unwrap();
        assert_eq!(harvest.state, HarvestState::Registered);
        assert_eq!(harvest.invoice_id, None);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        for q in [Decimal::ZERO, Decimal::from(-3)] {
            assert!(matches!(
                Harvest::new(FarmerId::new(), "ARROZ", q),
                Err(RegistryError::InvalidQuantity(_))
            ));
        }
    }

    #[test]
    fn quantity_beyond_four_places_is_rejected() {
        let q = Decimal::new(123_456, 5);
        assert!(matches!(
            Harvest::new(FarmerId::new(), "ARROZ", q),
            Err(RegistryError::QuantityOutOfRange(_))
        ));
        assert!(Harvest::new(FarmerId::new(), "ARROZ", Decimal::new(12_345, 4)).is_ok());
    }

    #[test]
    fn blank_product_is_rejected() {
        assert!(Harvest::new(FarmerId::new(), "  ", Decimal::ONE).is_err());
    }

    #[test]
    fn update_state_is_optional_in_json() {
        let update: HarvestUpdate =
            serde_json::from_str(r#"{"product": "MAIZ", "quantity": "4.5"}"#).unwrap();
        assert_eq!(update.state, None);
        assert_eq!(update.quantity, Decimal::new(45, 1));
    }
}
