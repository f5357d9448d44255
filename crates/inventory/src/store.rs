use async_trait::async_trait;
use common::{HarvestId, ItemId};
use serde::{Deserialize, Serialize};

use crate::{InventoryItem, InventoryStats, Requirement, Result};

/// Result of consuming supplies for one harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumptionOutcome {
    /// Decrements were applied to every existing row.
    Applied {
        applied: Vec<Requirement>,
        /// Names of rows that do not exist; nothing was taken for them.
        missing: Vec<String>,
    },
    /// The harvest was consumed before; nothing changed.
    AlreadyProcessed,
}

/// Persistence for stock rows.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Fails with `DuplicateName` if a row with the same name (ignoring
    /// case) exists.
    async fn insert(&self, item: &InventoryItem) -> Result<()>;

    async fn get(&self, id: ItemId) -> Result<Option<InventoryItem>>;

    /// Lists rows ordered by name.
    async fn list(&self) -> Result<Vec<InventoryItem>>;

    /// Lists rows of a category ordered by name.
    async fn list_by_category(&self, category: &str) -> Result<Vec<InventoryItem>>;

    /// Lists rows with `stock <= limit`, lowest stock first.
    async fn low_stock(&self, limit: i64) -> Result<Vec<InventoryItem>>;

    /// Replaces a row. Returns false if it does not exist.
    async fn update(&self, item: &InventoryItem) -> Result<bool>;

    /// Sets a row's stock. Returns the updated row, or `None` if it does
    /// not exist.
    async fn set_stock(&self, id: ItemId, stock: i64) -> Result<Option<InventoryItem>>;

    /// Adds `delta` to a row's stock in one atomic step, unless the result
    /// would be negative.
    async fn adjust_stock(&self, id: ItemId, delta: i64) -> Result<Option<InventoryItem>>;

    /// Returns false if the row did not exist.
    async fn delete(&self, id: ItemId) -> Result<bool>;

    /// Summarises the ledger, counting rows with `stock <= low_stock_limit`
    /// as low.
    async fn stats(&self, low_stock_limit: i64) -> Result<InventoryStats>;

    /// Applies every requirement for a harvest and records the harvest as
    /// processed, as one atomic unit.
    ///
    /// Each decrement is applied without a floor. Requirements naming
    /// unknown rows are skipped and reported as missing.
    async fn consume_for_harvest(
        &self,
        harvest_id: HarvestId,
        requirements: &[Requirement],
    ) -> Result<ConsumptionOutcome>;
}
