use async_trait::async_trait;
use contracts::{Contract, InvoiceCreated, queues};
use event_bus::{Consumer, ConsumerError, EventEnvelope};

use crate::{HarvestService, RegistryError};

/// Records on each harvest the invoice billing issued for it.
///
/// Linking is idempotent. An `InvoiceCreated` for a harvest the registry
/// does not know is logged and acknowledged; retrying cannot fix it.
pub struct InvoiceLinkConsumer {
    service: HarvestService,
}

impl InvoiceLinkConsumer {
    pub fn new(service: HarvestService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Consumer for InvoiceLinkConsumer {
    fn name(&self) -> &'static str {
        "registry.invoice-link"
    }

    fn queue(&self) -> &'static str {
        queues::REGISTRY_INVOICE_CREATED
    }

    fn event_types(&self) -> Vec<&'static str> {
        vec![InvoiceCreated::EVENT_TYPE]
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let event = InvoiceCreated::from_envelope(envelope)?;

        match self
            .service
            .link_invoice(event.harvest_id, event.invoice_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(RegistryError::HarvestNotFound(id)) => {
                tracing::warn!(
                    harvest_id = %id,
                    invoice_id = %event.invoice_id,
                    "invoice issued for unknown harvest, ignoring"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
