//! Billing ledger.
//!
//! Issues exactly one invoice per harvest when it receives
//! [`HarvestInProcess`](contracts::HarvestInProcess), priced through a
//! [`PricingPolicy`] with 19% VAT, and publishes
//! [`InvoiceCreated`](contracts::InvoiceCreated). Invoices then move
//! `PENDING → PAID → VOIDED` (or straight to `VOIDED`) on request.
//!
//! At most one invoice per harvest is enforced twice: a lookup before
//! issuing, and a uniqueness constraint in the store for concurrent
//! deliveries that pass the lookup together.

pub mod consumer;
pub mod error;
pub mod invoice;
pub mod memory;
pub mod postgres;
pub mod pricing;
pub mod service;
pub mod state;
pub mod store;

pub use consumer::HarvestInProcessConsumer;
pub use error::{BillingError, Result};
pub use invoice::{BillingStats, Invoice, InvoiceLineItem, NewInvoice, StateChange};
pub use memory::InMemoryInvoiceStore;
pub use postgres::PostgresInvoiceStore;
pub use pricing::{InvoiceComputation, PricingPolicy, StaticPriceTable, TAX_RATE};
pub use service::BillingService;
pub use state::InvoiceState;
pub use store::InvoiceStore;
