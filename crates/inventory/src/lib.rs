//! Inventory ledger.
//!
//! Keeps stock rows and consumes supplies when a harvest is registered:
//! every [`HarvestCreated`](contracts::HarvestCreated) decrements the rows
//! named by the [`ConsumptionFormula`]. Each decrement is a single atomic
//! statement, and the harvest id is recorded in the same transaction, so
//! concurrent harvests never lose updates and a redelivered message never
//! consumes twice.

pub mod consumer;
pub mod error;
pub mod formula;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use consumer::HarvestCreatedConsumer;
pub use error::{InventoryError, Result};
pub use formula::{ConsumptionFormula, Requirement};
pub use item::{InventoryItem, InventoryStats, ItemUpdate, NewItem};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use service::{DEFAULT_LOW_STOCK_LIMIT, InventoryService};
pub use store::{ConsumptionOutcome, InventoryStore};
