use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Result};

/// Stock row holding rice seed.
pub const SEED_ITEM: &str = "seed-rice";

/// Stock row holding NPK fertilizer.
pub const FERTILIZER_ITEM: &str = "npk-fertilizer";

/// Stock to take from one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub item_name: String,
    pub quantity: i64,
}

/// Supplies consumed per ton of harvest.
///
/// The same rows are used whatever the product; the default takes 5 kg of
/// seed and 2 kg of fertilizer per ton.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionFormula {
    factors: Vec<(String, Decimal)>,
}

impl ConsumptionFormula {
    /// Creates a formula from `(item name, units per ton)` pairs.
    pub fn new(factors: impl IntoIterator<Item = (impl Into<String>, Decimal)>) -> Self {
        Self {
            factors: factors
                .into_iter()
                .map(|(name, factor)| (name.into(), factor))
                .collect(),
        }
    }

    /// Stock to take for a harvest of `quantity` tons: `floor(quantity × factor)`
    /// per row. Rows whose requirement floors to zero are left out.
    pub fn requirements(&self, quantity: Decimal) -> Result<Vec<Requirement>> {
        if quantity <= Decimal::ZERO {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let mut requirements = Vec::with_capacity(self.factors.len());
        for (item_name, factor) in &self.factors {
            let units = quantity
                .checked_mul(*factor)
                .map(|v| v.floor())
                .and_then(|v| v.to_i64())
                .ok_or(InventoryError::QuantityOutOfRange(quantity))?;

            if units > 0 {
                requirements.push(Requirement {
                    item_name: item_name.clone(),
                    quantity: units,
                });
            }
        }
        Ok(requirements)
    }
}

impl Default for ConsumptionFormula {
    fn default() -> Self {
        Self::new([
            (SEED_ITEM, Decimal::from(5)),
            (FERTILIZER_ITEM, Decimal::from(2)),
        ])
    }
}
