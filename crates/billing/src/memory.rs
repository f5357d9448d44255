use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{FarmerId, HarvestId, InvoiceId};
use tokio::sync::RwLock;

use crate::{BillingError, BillingStats, Invoice, InvoiceState, InvoiceStore, Result};

#[derive(Default)]
struct Ledger {
    invoices: HashMap<InvoiceId, Invoice>,
    by_harvest: HashMap<HarvestId, InvoiceId>,
}

/// In-memory invoice store.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceStore {
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryInvoiceStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut invoices: Vec<Invoice>) -> Vec<Invoice> {
    invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    invoices
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, invoice: &Invoice) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        if ledger.by_harvest.contains_key(&invoice.harvest_id) {
            return Err(BillingError::DuplicateInvoice(invoice.harvest_id));
        }
        ledger.by_harvest.insert(invoice.harvest_id, invoice.id);
        ledger.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.ledger.read().await.invoices.get(&id).cloned())
    }

    async fn get_by_harvest(&self, harvest_id: HarvestId) -> Result<Option<Invoice>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .by_harvest
            .get(&harvest_id)
            .and_then(|id| ledger.invoices.get(id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Invoice>> {
        let invoices = self.ledger.read().await.invoices.values().cloned().collect();
        Ok(newest_first(invoices))
    }

    async fn list_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Invoice>> {
        let invoices = self
            .ledger
            .read()
            .await
            .invoices
            .values()
            .filter(|i| i.farmer_id == farmer_id)
            .cloned()
            .collect();
        Ok(newest_first(invoices))
    }

    async fn update_state(
        &self,
        invoice: &Invoice,
        expected_state: InvoiceState,
    ) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        match ledger.invoices.get_mut(&invoice.id) {
            Some(existing) if existing.state == expected_state => {
                existing.state = invoice.state;
                existing.paid_at = invoice.paid_at;
                existing.notes = invoice.notes.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_pending(&self, id: InvoiceId) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        let harvest_id = match ledger.invoices.get(&id) {
            Some(invoice) if invoice.state.can_delete() => invoice.harvest_id,
            _ => return Ok(false),
        };
        ledger.invoices.remove(&id);
        ledger.by_harvest.remove(&harvest_id);
        Ok(true)
    }

    async fn stats(&self, month_start: DateTime<Utc>) -> Result<BillingStats> {
        let ledger = self.ledger.read().await;
        let mut stats = BillingStats {
            total_invoices: ledger.invoices.len(),
            ..BillingStats::default()
        };

        for invoice in ledger.invoices.values() {
            match invoice.state {
                InvoiceState::Pending => stats.pending += 1,
                InvoiceState::Voided => stats.voided += 1,
                InvoiceState::Paid => {
                    stats.paid += 1;
                    stats.total_paid += invoice.total;
                    if invoice.paid_at.is_some_and(|at| at >= month_start) {
                        stats.paid_this_month += invoice.total;
                    }
                }
            }
        }

        Ok(stats)
    }
}
