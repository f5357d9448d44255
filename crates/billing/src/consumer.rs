use async_trait::async_trait;
use contracts::{Contract, HarvestInProcess, queues};
use event_bus::{Consumer, ConsumerError, EventEnvelope};

use crate::BillingService;

/// Issues one invoice per harvest that enters processing.
///
/// Redelivery is safe: a harvest that already has an invoice is skipped.
pub struct HarvestInProcessConsumer {
    service: BillingService,
}

impl HarvestInProcessConsumer {
    pub fn new(service: BillingService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Consumer for HarvestInProcessConsumer {
    fn name(&self) -> &'static str {
        "billing.harvest-invoicing"
    }

    fn queue(&self) -> &'static str {
        queues::BILLING_HARVEST_IN_PROCESS
    }

    fn event_types(&self) -> Vec<&'static str> {
        vec![HarvestInProcess::EVENT_TYPE]
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let event = HarvestInProcess::from_envelope(envelope)?;
        self.service.invoice_harvest(&event).await?;
        Ok(())
    }
}
