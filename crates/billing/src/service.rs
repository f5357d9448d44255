//! Billing service.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use common::{FarmerId, HarvestId, InvoiceId};
use contracts::{Contract, HarvestInProcess, InvoiceCreated};
use event_bus::EventBus;

use crate::{
    BillingError, BillingStats, Invoice, InvoiceState, InvoiceStore, NewInvoice, PricingPolicy,
    Result, StateChange, StaticPriceTable,
};

const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Service for issuing invoices and managing their lifecycle.
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn InvoiceStore>,
    bus: Arc<dyn EventBus>,
    pricing: Arc<dyn PricingPolicy>,
}

impl BillingService {
    /// Creates a service priced by the standard [`StaticPriceTable`].
    pub fn new(store: Arc<dyn InvoiceStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            pricing: Arc::new(StaticPriceTable::default()),
        }
    }

    /// Replaces the pricing policy.
    pub fn with_pricing(mut self, pricing: Arc<dyn PricingPolicy>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Issues an invoice with an explicit unit price and publishes
    /// `InvoiceCreated`.
    #[tracing::instrument(skip(self, request), fields(harvest_id = %request.harvest_id))]
    pub async fn create_invoice(&self, request: NewInvoice) -> Result<Invoice> {
        let invoice = Invoice::issue(request)?;

        if self.store.get_by_harvest(invoice.harvest_id).await?.is_some() {
            return Err(BillingError::DuplicateInvoice(invoice.harvest_id));
        }
        self.store.insert(&invoice).await?;
        self.issued(&invoice).await?;
        Ok(invoice)
    }

    /// Issues the invoice for a harvest that entered processing.
    ///
    /// Returns `None` when the harvest is already invoiced, either found up
    /// front or lost to a concurrent insert. An invoice found up front is
    /// announced again, since the delivery that stored it may have failed to
    /// publish.
    #[tracing::instrument(skip(self, event), fields(harvest_id = %event.harvest_id))]
    pub async fn invoice_harvest(&self, event: &HarvestInProcess) -> Result<Option<Invoice>> {
        if let Some(existing) = self.store.get_by_harvest(event.harvest_id).await? {
            metrics::counter!("billing_duplicate_deliveries_total").increment(1);
            tracing::info!(invoice_id = %existing.id, "harvest already invoiced, announcing again");
            self.announce(&existing).await?;
            return Ok(None);
        }

        let unit_price = self.pricing.unit_price(&event.product);
        let invoice = Invoice::issue(NewInvoice {
            harvest_id: event.harvest_id,
            farmer_id: event.farmer_id,
            farmer_name: event.farmer_name.clone(),
            product: event.product.clone(),
            quantity: event.quantity,
            unit_price,
            notes: None,
        })?;

        match self.store.insert(&invoice).await {
            Ok(()) => {}
            Err(BillingError::DuplicateInvoice(_)) => {
                metrics::counter!("billing_duplicate_deliveries_total").increment(1);
                tracing::info!("concurrent delivery invoiced the harvest first, skipping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        self.issued(&invoice).await?;
        Ok(Some(invoice))
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice> {
        self.store
            .get(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    pub async fn get_invoice_by_harvest(&self, harvest_id: HarvestId) -> Result<Invoice> {
        self.store
            .get_by_harvest(harvest_id)
            .await?
            .ok_or(BillingError::NoInvoiceForHarvest(harvest_id))
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.store.list().await
    }

    pub async fn list_invoices_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Invoice>> {
        self.store.list_by_farmer(farmer_id).await
    }

    /// Moves an invoice along its lifecycle.
    #[tracing::instrument(skip(self, change), fields(target = %change.state))]
    pub async fn change_state(&self, id: InvoiceId, change: StateChange) -> Result<Invoice> {
        let target: InvoiceState = change.state.parse()?;

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.get_invoice(id).await?;
            let mut next = current.clone();
            next.transition(target, change.paid_at, change.notes.clone())?;

            if !self.store.update_state(&next, current.state).await? {
                tracing::debug!(invoice_id = %id, "invoice changed concurrently, retrying");
                continue;
            }

            metrics::counter!(
                "billing_state_transitions_total",
                "from" => current.state.as_str(),
                "to" => next.state.as_str()
            )
            .increment(1);
            tracing::info!(invoice_id = %id, from = %current.state, to = %next.state, "invoice state changed");
            return Ok(next);
        }

        Err(BillingError::ConcurrentUpdate(id))
    }

    /// Deletes an invoice. Only `Pending` invoices can be deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_invoice(&self, id: InvoiceId) -> Result<()> {
        if self.store.delete_pending(id).await? {
            tracing::info!(invoice_id = %id, "invoice deleted");
            return Ok(());
        }

        match self.store.get(id).await? {
            Some(invoice) => Err(BillingError::NotDeletable {
                id,
                state: invoice.state,
            }),
            None => Err(BillingError::InvoiceNotFound(id)),
        }
    }

    pub async fn stats(&self) -> Result<BillingStats> {
        self.store.stats(month_start(Utc::now())).await
    }

    async fn issued(&self, invoice: &Invoice) -> Result<()> {
        metrics::counter!("billing_invoices_created_total").increment(1);
        tracing::info!(
            invoice_id = %invoice.id,
            product = %invoice.product,
            total = %invoice.total,
            "invoice issued"
        );
        self.announce(invoice).await
    }

    /// Publishes `InvoiceCreated` for a stored invoice.
    async fn announce(&self, invoice: &Invoice) -> Result<()> {
        let mut envelope = InvoiceCreated {
            invoice_id: invoice.id,
            harvest_id: invoice.harvest_id,
            farmer_id: invoice.farmer_id,
            total: invoice.total,
            timestamp: Utc::now(),
        }
        .to_envelope()?;
        envelope
            .metadata
            .insert("publisher".to_string(), serde_json::json!("billing"));

        let routed = self.bus.publish(envelope).await?;
        tracing::debug!(event_type = InvoiceCreated::EVENT_TYPE, routed, "event published");
        Ok(())
    }
}

/// Midnight UTC on the first day of `now`'s month.
fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn month_start_is_first_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 8, 19, 15, 42, 7).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap()
        );
    }
}
