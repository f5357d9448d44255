use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{FarmerId, HarvestId, InvoiceId};

use crate::{BillingStats, Invoice, InvoiceState, Result};

/// Persistence for invoices and their line items.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Stores an invoice and its line items atomically.
    ///
    /// Fails with [`BillingError::DuplicateInvoice`](crate::BillingError::DuplicateInvoice)
    /// if the harvest already has an invoice.
    async fn insert(&self, invoice: &Invoice) -> Result<()>;

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>>;

    async fn get_by_harvest(&self, harvest_id: HarvestId) -> Result<Option<Invoice>>;

    /// Lists invoices, newest first.
    async fn list(&self) -> Result<Vec<Invoice>>;

    /// Lists a farmer's invoices, newest first.
    async fn list_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Invoice>>;

    /// Writes state, `paid_at` and notes, but only while the stored state
    /// is still `expected_state`. Returns false otherwise.
    async fn update_state(&self, invoice: &Invoice, expected_state: InvoiceState)
    -> Result<bool>;

    /// Deletes an invoice while it is `Pending`.
    ///
    /// Returns false if no `Pending` invoice with this id exists.
    async fn delete_pending(&self, id: InvoiceId) -> Result<bool>;

    /// Counts and sums over the ledger. `month_start` bounds the
    /// paid-this-month sum.
    async fn stats(&self, month_start: DateTime<Utc>) -> Result<BillingStats>;
}
