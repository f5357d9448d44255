//! Inventory service.

use std::sync::Arc;

use common::ItemId;
use contracts::HarvestCreated;

use crate::{
    ConsumptionFormula, ConsumptionOutcome, InventoryError, InventoryItem, InventoryStats,
    InventoryStore, ItemUpdate, NewItem, Result,
};

/// Rows at or below this stock count as low unless a caller says otherwise.
pub const DEFAULT_LOW_STOCK_LIMIT: i64 = 10;

/// Service for stock rows and harvest-driven consumption.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    formula: ConsumptionFormula,
}

impl InventoryService {
    /// Creates a service with the default consumption formula.
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self {
            store,
            formula: ConsumptionFormula::default(),
        }
    }

    /// Replaces the consumption formula.
    pub fn with_formula(mut self, formula: ConsumptionFormula) -> Self {
        self.formula = formula;
        self
    }

    #[tracing::instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_item(&self, request: NewItem) -> Result<InventoryItem> {
        let item = InventoryItem::new(request)?;
        self.store.insert(&item).await?;
        tracing::info!(item_id = %item.id, name = %item.name, "inventory item created");
        Ok(item)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<InventoryItem> {
        self.store
            .get(id)
            .await?
            .ok_or(InventoryError::ItemNotFound(id))
    }

    pub async fn list_items(&self) -> Result<Vec<InventoryItem>> {
        self.store.list().await
    }

    pub async fn list_by_category(&self, category: &str) -> Result<Vec<InventoryItem>> {
        self.store.list_by_category(category.trim()).await
    }

    /// Rows with stock at or below `limit` (default 10), lowest first.
    pub async fn low_stock(&self, limit: Option<i64>) -> Result<Vec<InventoryItem>> {
        self.store
            .low_stock(limit.unwrap_or(DEFAULT_LOW_STOCK_LIMIT))
            .await
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_item(&self, id: ItemId, update: ItemUpdate) -> Result<InventoryItem> {
        let mut item = self.get_item(id).await?;
        item.apply(update)?;

        if !self.store.update(&item).await? {
            return Err(InventoryError::ItemNotFound(id));
        }
        Ok(item)
    }

    /// Overwrites a row's stock. Negative values are rejected.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, id: ItemId, stock: i64) -> Result<InventoryItem> {
        if stock < 0 {
            return Err(InventoryError::NegativeStock(stock));
        }

        let item = self
            .store
            .set_stock(id, stock)
            .await?
            .ok_or(InventoryError::ItemNotFound(id))?;
        tracing::info!(item_id = %id, name = %item.name, stock, "stock set");
        Ok(item)
    }

    /// Adds a signed `delta` to a row's stock atomically.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, id: ItemId, delta: i64) -> Result<InventoryItem> {
        let item = self
            .store
            .adjust_stock(id, delta)
            .await?
            .ok_or(InventoryError::ItemNotFound(id))?;
        tracing::info!(item_id = %id, delta, stock = item.stock, "stock adjusted");
        Ok(item)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_item(&self, id: ItemId) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(InventoryError::ItemNotFound(id));
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<InventoryStats> {
        self.store.stats(DEFAULT_LOW_STOCK_LIMIT).await
    }

    /// Takes the supplies a registered harvest needs.
    ///
    /// Safe to call more than once for the same harvest: later calls return
    /// [`ConsumptionOutcome::AlreadyProcessed`] without touching stock.
    #[tracing::instrument(skip(self, event), fields(harvest_id = %event.harvest_id))]
    pub async fn consume_for_harvest(&self, event: &HarvestCreated) -> Result<ConsumptionOutcome> {
        let requirements = self.formula.requirements(event.quantity)?;
        let outcome = self
            .store
            .consume_for_harvest(event.harvest_id, &requirements)
            .await?;

        match &outcome {
            ConsumptionOutcome::AlreadyProcessed => {
                metrics::counter!("inventory_duplicate_deliveries_total").increment(1);
                tracing::info!("harvest already consumed, skipping");
            }
            ConsumptionOutcome::Applied { applied, missing } => {
                metrics::counter!("inventory_consumptions_total").increment(1);
                for requirement in applied {
                    tracing::info!(
                        item = %requirement.item_name,
                        quantity = requirement.quantity,
                        "stock consumed"
                    );
                }
                for name in missing {
                    tracing::warn!(item = %name, "inventory row missing, consumption skipped");
                }
            }
        }

        Ok(outcome)
    }
}
