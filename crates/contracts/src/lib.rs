//! Integration events of the harvest choreography.
//!
//! Every event is a plain struct with a fixed schema and an explicit
//! version. Publishers turn a contract into an [`EventEnvelope`]; consumers
//! decode it back and reject payloads from a newer schema than they know.
//!
//! JSON field names are camelCase and decimals travel as strings, so a
//! quantity of `10.5` is `"10.5"` on the wire.

pub mod error;
pub mod events;
pub mod quantity;
pub mod queues;

pub use error::ContractError;
pub use event_bus::EventEnvelope;
pub use events::{Contract, HarvestCreated, HarvestInProcess, IntegrationEvent, InvoiceCreated};
pub use quantity::{MAX_QUANTITY, QUANTITY_SCALE, quantity_in_range};
