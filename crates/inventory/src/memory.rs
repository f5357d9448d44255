use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{HarvestId, ItemId};
use tokio::sync::RwLock;

use crate::{
    ConsumptionOutcome, InventoryError, InventoryItem, InventoryStats, InventoryStore,
    Requirement, Result,
};

#[derive(Default)]
struct Ledger {
    items: HashMap<ItemId, InventoryItem>,
    processed: HashSet<HarvestId>,
}

impl Ledger {
    fn name_taken(&self, item: &InventoryItem) -> bool {
        let key = item.name_key();
        self.items
            .values()
            .any(|other| other.id != item.id && other.name_key() == key)
    }

    fn find_by_name(&self, name: &str) -> Option<&InventoryItem> {
        let key = name.to_lowercase();
        self.items.values().find(|item| item.name_key() == key)
    }
}

/// In-memory inventory store.
///
/// One lock guards rows and processed harvests together, which gives the
/// same atomicity as the PostgreSQL transaction.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the harvest was consumed.
    pub async fn is_processed(&self, harvest_id: HarvestId) -> bool {
        self.ledger.read().await.processed.contains(&harvest_id)
    }
}

fn sorted_by_name(mut items: Vec<InventoryItem>) -> Vec<InventoryItem> {
    items.sort_by(|a, b| a.name.cmp(&b.name));
    items
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert(&self, item: &InventoryItem) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        if ledger.name_taken(item) {
            return Err(InventoryError::DuplicateName(item.name.clone()));
        }
        ledger.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get(&self, id: ItemId) -> Result<Option<InventoryItem>> {
        Ok(self.ledger.read().await.items.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<InventoryItem>> {
        let items = self.ledger.read().await.items.values().cloned().collect();
        Ok(sorted_by_name(items))
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<InventoryItem>> {
        let items = self
            .ledger
            .read()
            .await
            .items
            .values()
            .filter(|item| item.category.as_deref() == Some(category))
            .cloned()
            .collect();
        Ok(sorted_by_name(items))
    }

    async fn low_stock(&self, limit: i64) -> Result<Vec<InventoryItem>> {
        let mut items: Vec<InventoryItem> = self
            .ledger
            .read()
            .await
            .items
            .values()
            .filter(|item| item.stock <= limit)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    async fn update(&self, item: &InventoryItem) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        if !ledger.items.contains_key(&item.id) {
            return Ok(false);
        }
        if ledger.name_taken(item) {
            return Err(InventoryError::DuplicateName(item.name.clone()));
        }
        ledger.items.insert(item.id, item.clone());
        Ok(true)
    }

    async fn set_stock(&self, id: ItemId, stock: i64) -> Result<Option<InventoryItem>> {
        let mut ledger = self.ledger.write().await;
        Ok(ledger.items.get_mut(&id).map(|item| {
            item.stock = stock;
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn adjust_stock(&self, id: ItemId, delta: i64) -> Result<Option<InventoryItem>> {
        let mut ledger = self.ledger.write().await;
        let Some(item) = ledger.items.get_mut(&id) else {
            return Ok(None);
        };

        match item.stock.checked_add(delta) {
            Some(stock) if stock >= 0 => {
                item.stock = stock;
                item.updated_at = Utc::now();
                Ok(Some(item.clone()))
            }
            _ => Err(InventoryError::InsufficientStock { id, delta }),
        }
    }

    async fn delete(&self, id: ItemId) -> Result<bool> {
        Ok(self.ledger.write().await.items.remove(&id).is_some())
    }

    async fn stats(&self, low_stock_limit: i64) -> Result<InventoryStats> {
        let ledger = self.ledger.read().await;
        let mut stats = InventoryStats {
            total_items: ledger.items.len(),
            ..InventoryStats::default()
        };

        for item in ledger.items.values() {
            stats.total_stock = stats
                .total_stock
                .checked_add(item.stock)
                .ok_or_else(|| InventoryError::StockOutOfRange("total stock".to_string()))?;
            if item.stock <= low_stock_limit {
                stats.low_stock_items += 1;
            }
            if let Some(category) = &item.category {
                *stats
                    .items_per_category
                    .entry(category.clone())
                    .or_default() += 1;
            }
        }
        Ok(stats)
    }

    async fn consume_for_harvest(
        &self,
        harvest_id: HarvestId,
        requirements: &[Requirement],
    ) -> Result<ConsumptionOutcome> {
        let mut ledger = self.ledger.write().await;
        if ledger.processed.contains(&harvest_id) {
            return Ok(ConsumptionOutcome::AlreadyProcessed);
        }

        // Every new stock level is computed before any is written.
        let mut levels: HashMap<ItemId, i64> = HashMap::new();
        let mut applied = Vec::new();
        let mut missing = Vec::new();
        for requirement in requirements {
            let Some(item) = ledger.find_by_name(&requirement.item_name) else {
                missing.push(requirement.item_name.clone());
                continue;
            };
            let current = levels.get(&item.id).copied().unwrap_or(item.stock);
            let level = current.checked_sub(requirement.quantity).ok_or_else(|| {
                InventoryError::StockOutOfRange(format!(
                    "consuming {} of '{}'",
                    requirement.quantity, item.name
                ))
            })?;
            levels.insert(item.id, level);
            applied.push(requirement.clone());
        }

        let now = Utc::now();
        for (id, level) in levels {
            if let Some(item) = ledger.items.get_mut(&id) {
                item.stock = level;
                item.updated_at = now;
            }
        }
        ledger.processed.insert(harvest_id);

        Ok(ConsumptionOutcome::Applied { applied, missing })
    }
}
