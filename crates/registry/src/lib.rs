//! Harvest registry.
//!
//! Owns farmers and harvests. A harvest moves through
//! `REGISTERED → IN_PROCESS → INVOICED → COMPLETED` under an explicit
//! [`TransitionTable`]. The registry publishes:
//!
//! - [`HarvestCreated`](contracts::HarvestCreated) after a harvest is stored
//! - [`HarvestInProcess`](contracts::HarvestInProcess) on every edge into
//!   `IN_PROCESS`, never on a no-op change to the same state
//!
//! and consumes [`InvoiceCreated`](contracts::InvoiceCreated) to remember
//! which invoice belongs to which harvest.

pub mod consumer;
pub mod error;
pub mod farmer;
pub mod harvest;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod state;
pub mod store;

pub use consumer::InvoiceLinkConsumer;
pub use error::{RegistryError, Result};
pub use farmer::{Farmer, FarmerDetails};
pub use harvest::{Harvest, HarvestUpdate, NewHarvest};
pub use memory::InMemoryHarvestStore;
pub use postgres::PostgresHarvestStore;
pub use service::HarvestService;
pub use state::{HarvestState, TransitionTable};
pub use store::HarvestStore;
