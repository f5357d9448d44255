use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{FarmerId, HarvestId, InvoiceId};
use tokio::sync::RwLock;

use crate::{Farmer, Harvest, HarvestState, HarvestStore, Result};

/// In-memory harvest store.
#[derive(Clone, Default)]
pub struct InMemoryHarvestStore {
    farmers: Arc<RwLock<HashMap<FarmerId, Farmer>>>,
    harvests: Arc<RwLock<HashMap<HarvestId, Harvest>>>,
}

impl InMemoryHarvestStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HarvestStore for InMemoryHarvestStore {
    async fn insert_farmer(&self, farmer: &Farmer) -> Result<()> {
        self.farmers.write().await.insert(farmer.id, farmer.clone());
        Ok(())
    }

    async fn get_farmer(&self, id: FarmerId) -> Result<Option<Farmer>> {
        Ok(self.farmers.read().await.get(&id).cloned())
    }

    async fn list_farmers(&self) -> Result<Vec<Farmer>> {
        let mut farmers: Vec<Farmer> = self.farmers.read().await.values().cloned().collect();
        farmers.sort_by_key(|f| f.registered_at);
        Ok(farmers)
    }

    async fn update_farmer(&self, farmer: &Farmer) -> Result<bool> {
        let mut farmers = self.farmers.write().await;
        match farmers.get_mut(&farmer.id) {
            Some(existing) => {
                *existing = farmer.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_farmer(&self, id: FarmerId) -> Result<bool> {
        Ok(self.farmers.write().await.remove(&id).is_some())
    }

    async fn insert_harvest(&self, harvest: &Harvest) -> Result<()> {
        self.harvests
            .write()
            .await
            .insert(harvest.id, harvest.clone());
        Ok(())
    }

    async fn get_harvest(&self, id: HarvestId) -> Result<Option<Harvest>> {
        Ok(self.harvests.read().await.get(&id).cloned())
    }

    async fn list_harvests(&self) -> Result<Vec<Harvest>> {
        let mut harvests: Vec<Harvest> = self.harvests.read().await.values().cloned().collect();
        harvests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(harvests)
    }

    async fn list_harvests_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Harvest>> {
        let mut harvests: Vec<Harvest> = self
            .harvests
            .read()
            .await
            .values()
            .filter(|h| h.farmer_id == farmer_id)
            .cloned()
            .collect();
        harvests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(harvests)
    }

    async fn update_harvest(
        &self,
        harvest: &Harvest,
        expected_state: HarvestState,
    ) -> Result<bool> {
        let mut harvests = self.harvests.write().await;
        match harvests.get_mut(&harvest.id) {
            Some(existing) if existing.state == expected_state => {
                existing.product = harvest.product.clone();
                existing.quantity = harvest.quantity;
                existing.state = harvest.state;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_registered_harvest(&self, id: HarvestId) -> Result<bool> {
        let mut harvests = self.harvests.write().await;
        match harvests.get(&id) {
            Some(h) if h.state.can_delete() => {
                harvests.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_invoice(&self, id: HarvestId, invoice_id: InvoiceId) -> Result<bool> {
        let mut harvests = self.harvests.write().await;
        match harvests.get_mut(&id) {
            Some(h) => {
                h.invoice_id = Some(invoice_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
