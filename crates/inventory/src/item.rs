use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::ItemId;
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Result};

/// Unit used when none is given.
pub const DEFAULT_UNIT: &str = "kg";

/// A stock row.
///
/// `stock` may go negative through harvest consumption; manual operations
/// never set it below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub stock: i64,
    pub unit: String,
    pub category: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Creates an item from a validated request.
    pub fn new(request: NewItem) -> Result<Self> {
        let fields = Fields::validate(request.name, request.stock, request.unit, request.category)?;
        Ok(Self {
            id: ItemId::new(),
            name: fields.name,
            stock: fields.stock,
            unit: fields.unit,
            category: fields.category,
            updated_at: Utc::now(),
        })
    }

    /// Replaces every editable field.
    pub fn apply(&mut self, update: ItemUpdate) -> Result<()> {
        let fields = Fields::validate(update.name, update.stock, update.unit, update.category)?;
        self.name = fields.name;
        self.stock = fields.stock;
        self.unit = fields.unit;
        self.category = fields.category;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Lower-cased name used for uniqueness checks.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Request to create a stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Full replacement of a stock row's editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub name: String,
    pub stock: i64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Summary of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total_items: usize,
    pub total_stock: i64,
    pub low_stock_items: usize,
    pub items_per_category: BTreeMap<String, usize>,
}

struct Fields {
    name: String,
    stock: i64,
    unit: String,
    category: Option<String>,
}

impl Fields {
    fn validate(
        name: String,
        stock: i64,
        unit: Option<String>,
        category: Option<String>,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InventoryError::InvalidField {
                field: "name",
                reason: "is required",
            });
        }
        if name.chars().count() > 100 {
            return Err(InventoryError::InvalidField {
                field: "name",
                reason: "is too long",
            });
        }
        if stock < 0 {
            return Err(InventoryError::NegativeStock(stock));
        }

        let unit = unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_UNIT.to_string());
        if unit.chars().count() > 10 {
            return Err(InventoryError::InvalidField {
                field: "unit",
                reason: "is too long",
            });
        }

        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if category.as_ref().is_some_and(|c| c.chars().count() > 30) {
            return Err(InventoryError::InvalidField {
                field: "category",
                reason: "is too long",
            });
        }

        Ok(Self {
            name: name.to_string(),
            stock,
            unit,
            category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> NewItem {
        NewItem {
            name: name.to_string(),
            stock: 100,
            unit: None,
            category: Some("  ".to_string()),
        }
    }

    #[test]
    fn defaults_unit_and_drops_blank_category() {
        let item = InventoryItem::new(request(" seed-rice ")).unwrap();
        assert_eq!(item.name, "seed-rice");
        assert_eq!(item.unit, "kg");
        assert_eq!(item.category, None);
    }

    #[test]
    fn rejects_negative_stock() {
        let mut req = request("seed-rice");
        req.stock = -1;
        assert!(matches!(
            InventoryItem::new(req),
            Err(InventoryError::NegativeStock(-1))
        ));
    }

    #[test]
    fn rejects_blank_name() {
        assert!(InventoryItem::new(request("   ")).is_err());
    }

    #[test]
    fn name_key_ignores_case() {
        let a = InventoryItem::new(request("Seed-Rice")).unwrap();
        let b = InventoryItem::new(request("seed-rice")).unwrap();
        assert_eq!(a.name_key(), b.name_key());
    }

    #[test]
    fn new_item_json_defaults() {
        let req: NewItem = serde_json::from_str(r#"{"name": "urea"}"#).unwrap();
        assert_eq!(req.stock, 0);
        assert_eq!(req.unit, None);
    }
}
