use async_trait::async_trait;
use contracts::{Contract, HarvestCreated, queues};
use event_bus::{Consumer, ConsumerError, EventEnvelope};

use crate::InventoryService;

/// Consumes supplies for every registered harvest.
pub struct HarvestCreatedConsumer {
    service: InventoryService,
}

impl HarvestCreatedConsumer {
    pub fn new(service: InventoryService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Consumer for HarvestCreatedConsumer {
    fn name(&self) -> &'static str {
        "inventory.harvest-consumption"
    }

    fn queue(&self) -> &'static str {
        queues::INVENTORY_HARVEST_CREATED
    }

    fn event_types(&self) -> Vec<&'static str> {
        vec![HarvestCreated::EVENT_TYPE]
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let event = HarvestCreated::from_envelope(envelope)?;
        self.service.consume_for_harvest(&event).await?;
        Ok(())
    }
}
