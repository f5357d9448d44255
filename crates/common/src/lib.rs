//! Types shared by every service in the harvest choreography.

pub mod types;

pub use types::{ErrorKind, EventId, FarmerId, HarvestId, InvoiceId, ItemId, LineItemId};
