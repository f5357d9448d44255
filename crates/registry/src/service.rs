//! Harvest registry service.

use std::sync::Arc;

use chrono::Utc;
use common::{FarmerId, HarvestId, InvoiceId};
use contracts::{Contract, HarvestCreated, HarvestInProcess};
use event_bus::EventBus;

use crate::harvest::{validate_product, validate_quantity};
use crate::{
    Farmer, FarmerDetails, Harvest, HarvestState, HarvestStore, HarvestUpdate, NewHarvest,
    RegistryError, Result, TransitionTable,
};

/// Name used when a harvest's farmer no longer exists.
pub const UNKNOWN_FARMER_NAME: &str = "Unknown";

/// Attempts at a compare-and-set state update before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Service for managing farmers and harvests.
///
/// Every harvest mutation is stored first and published second. If the
/// publish fails the caller gets [`RegistryError::Publish`] while the
/// stored change stays in place.
#[derive(Clone)]
pub struct HarvestService {
    store: Arc<dyn HarvestStore>,
    bus: Arc<dyn EventBus>,
    transitions: TransitionTable,
}

impl HarvestService {
    /// Creates a service using [`TransitionTable::LINEAR`].
    pub fn new(store: Arc<dyn HarvestStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            transitions: TransitionTable::default(),
        }
    }

    /// Replaces the transition table.
    pub fn with_transitions(mut self, transitions: TransitionTable) -> Self {
        self.transitions = transitions;
        self
    }

    /// Returns the transition table in use.
    pub fn transitions(&self) -> TransitionTable {
        self.transitions
    }

    // --- farmers ---

    #[tracing::instrument(skip(self, details))]
    pub async fn create_farmer(&self, details: FarmerDetails) -> Result<Farmer> {
        let farmer = Farmer::new(details)?;
        self.store.insert_farmer(&farmer).await?;
        tracing::info!(farmer_id = %farmer.id, "farmer registered");
        Ok(farmer)
    }

    pub async fn get_farmer(&self, id: FarmerId) -> Result<Farmer> {
        self.store
            .get_farmer(id)
            .await?
            .ok_or(RegistryError::FarmerNotFound(id))
    }

    pub async fn list_farmers(&self) -> Result<Vec<Farmer>> {
        self.store.list_farmers().await
    }

    #[tracing::instrument(skip(self, details))]
    pub async fn update_farmer(&self, id: FarmerId, details: FarmerDetails) -> Result<Farmer> {
        let mut farmer = self.get_farmer(id).await?;
        farmer.apply(details)?;

        if !self.store.update_farmer(&farmer).await? {
            return Err(RegistryError::FarmerNotFound(id));
        }
        Ok(farmer)
    }

    /// Deletes a farmer. Their harvests are kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete_farmer(&self, id: FarmerId) -> Result<()> {
        if !self.store.delete_farmer(id).await? {
            return Err(RegistryError::FarmerNotFound(id));
        }
        tracing::info!(farmer_id = %id, "farmer deleted");
        Ok(())
    }

    // --- harvests ---

    /// Registers a harvest and publishes `HarvestCreated`.
    #[tracing::instrument(skip(self, request), fields(farmer_id = %request.farmer_id))]
    pub async fn create_harvest(&self, request: NewHarvest) -> Result<Harvest> {
        let harvest = Harvest::new(request.farmer_id, &request.product, request.quantity)?;

        if self.store.get_farmer(request.farmer_id).await?.is_none() {
            return Err(RegistryError::UnknownFarmer(request.farmer_id));
        }

        self.store.insert_harvest(&harvest).await?;
        metrics::counter!("registry_harvests_created_total").increment(1);
        tracing::info!(harvest_id = %harvest.id, product = %harvest.product, "harvest registered");

        self.publish(&HarvestCreated {
            harvest_id: harvest.id,
            product: harvest.product.clone(),
            quantity: harvest.quantity,
            timestamp: Utc::now(),
        })
        .await?;

        Ok(harvest)
    }

    pub async fn get_harvest(&self, id: HarvestId) -> Result<Harvest> {
        self.store
            .get_harvest(id)
            .await?
            .ok_or(RegistryError::HarvestNotFound(id))
    }

    pub async fn list_harvests(&self) -> Result<Vec<Harvest>> {
        self.store.list_harvests().await
    }

    pub async fn list_harvests_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Harvest>> {
        self.store.list_harvests_by_farmer(farmer_id).await
    }

    /// Replaces product and quantity, and changes state if `update.state`
    /// names a different one.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_harvest(&self, id: HarvestId, update: HarvestUpdate) -> Result<Harvest> {
        let product = validate_product(&update.product)?;
        let quantity = validate_quantity(update.quantity)?;
        let target = update
            .state
            .as_deref()
            .map(str::parse::<HarvestState>)
            .transpose()?;

        self.modify(id, |current| {
            let mut next = current.clone();
            next.product = product.clone();
            next.quantity = quantity;
            if let Some(target) = target
                && target != current.state
            {
                self.transitions.check(current.state, target)?;
                next.state = target;
            }
            Ok(next)
        })
        .await
    }

    /// Moves a harvest to the state named by `target`.
    ///
    /// The name is parsed case-insensitively. Asking for the current state
    /// changes nothing and publishes nothing.
    pub async fn change_state(&self, id: HarvestId, target: &str) -> Result<Harvest> {
        let target: HarvestState = target.parse()?;
        self.set_state(id, target).await
    }

    /// Moves a harvest to `target` along the transition table.
    #[tracing::instrument(skip(self))]
    pub async fn set_state(&self, id: HarvestId, target: HarvestState) -> Result<Harvest> {
        self.modify(id, |current| {
            if current.state == target {
                return Ok(current.clone());
            }
            self.transitions.check(current.state, target)?;
            Ok(Harvest {
                state: target,
                ..current.clone()
            })
        })
        .await
    }

    /// Moves a harvest to the next state of the transition table.
    #[tracing::instrument(skip(self))]
    pub async fn advance(&self, id: HarvestId) -> Result<Harvest> {
        self.modify(id, |current| {
            let next = self
                .transitions
                .successor(current.state)
                .ok_or(RegistryError::NoSuccessor(current.state))?;
            Ok(Harvest {
                state: next,
                ..current.clone()
            })
        })
        .await
    }

    /// Deletes a harvest. Only `Registered` harvests can be deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_harvest(&self, id: HarvestId) -> Result<()> {
        let harvest = self.get_harvest(id).await?;
        if !harvest.state.can_delete() {
            return Err(RegistryError::NotDeletable {
                id,
                state: harvest.state,
            });
        }

        if !self.store.delete_registered_harvest(id).await? {
            // Deleted or moved on between the read and the delete.
            return match self.store.get_harvest(id).await? {
                Some(h) => Err(RegistryError::NotDeletable { id, state: h.state }),
                None => Err(RegistryError::HarvestNotFound(id)),
            };
        }

        tracing::info!(harvest_id = %id, "harvest deleted");
        Ok(())
    }

    /// Records the invoice issued for a harvest. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn link_invoice(&self, id: HarvestId, invoice_id: InvoiceId) -> Result<()> {
        if !self.store.set_invoice(id, invoice_id).await? {
            return Err(RegistryError::HarvestNotFound(id));
        }
        tracing::info!(harvest_id = %id, invoice_id = %invoice_id, "invoice linked to harvest");
        Ok(())
    }

    /// Applies `change` to the stored harvest with a compare-and-set on its
    /// state, then publishes `HarvestInProcess` if the harvest entered
    /// `InProcess`.
    ///
    /// When another writer moves the state first, `change` is re-evaluated
    /// against the fresh harvest, so the edge into `InProcess` is published
    /// by exactly one writer.
    async fn modify<F>(&self, id: HarvestId, change: F) -> Result<Harvest>
    where
        F: Fn(&Harvest) -> Result<Harvest>,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.get_harvest(id).await?;
            let next = change(&current)?;
            if next == current {
                return Ok(current);
            }

            if !self.store.update_harvest(&next, current.state).await? {
                tracing::debug!(harvest_id = %id, "harvest changed concurrently, retrying");
                continue;
            }

            if next.state != current.state {
                metrics::counter!(
                    "registry_state_transitions_total",
                    "from" => current.state.as_str(),
                    "to" => next.state.as_str()
                )
                .increment(1);
                tracing::info!(
                    harvest_id = %id,
                    from = %current.state,
                    to = %next.state,
                    "harvest state changed"
                );
            }

            if next.state == HarvestState::InProcess && current.state != HarvestState::InProcess {
                self.publish_in_process(&next).await?;
            }

            return Ok(next);
        }

        Err(RegistryError::ConcurrentUpdate(id))
    }

    async fn publish_in_process(&self, harvest: &Harvest) -> Result<()> {
        let farmer_name = match self.store.get_farmer(harvest.farmer_id).await? {
            Some(farmer) => farmer.name,
            None => {
                tracing::warn!(
                    harvest_id = %harvest.id,
                    farmer_id = %harvest.farmer_id,
                    "farmer not found, publishing with placeholder name"
                );
                UNKNOWN_FARMER_NAME.to_string()
            }
        };

        self.publish(&HarvestInProcess {
            harvest_id: harvest.id,
            farmer_id: harvest.farmer_id,
            farmer_name,
            product: harvest.product.clone(),
            quantity: harvest.quantity,
            timestamp: Utc::now(),
        })
        .await
    }

    async fn publish<C: Contract>(&self, event: &C) -> Result<()> {
        let mut envelope = event.to_envelope()?;
        envelope
            .metadata
            .insert("publisher".to_string(), serde_json::json!("registry"));

        let event_id = envelope.event_id;
        let routed = self.bus.publish(envelope).await?;
        metrics::counter!("registry_events_published_total", "event_type" => C::EVENT_TYPE)
            .increment(1);
        tracing::debug!(event_type = C::EVENT_TYPE, %event_id, routed, "event published");
        Ok(())
    }
}
