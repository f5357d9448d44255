//! Event bus for the harvest choreography.
//!
//! Publishers hand an [`EventEnvelope`] to the bus without naming a
//! destination; the bus copies it into every durable queue bound to the
//! envelope's event type. Each queue belongs to one consuming service and
//! is drained by a [`ConsumerWorker`]:
//!
//! - delivery is at-least-once: a message stays leased until acked, and a
//!   lease that expires is handed out again
//! - a failed delivery is requeued with exponential backoff
//! - after [`RetryPolicy::max_attempts`] failures the message is moved to
//!   the queue's dead-letter store for manual inspection
//! - there is no ordering guarantee across queues or event types

pub mod bus;
pub mod consumer;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod worker;

pub use bus::{
    DeadLetter, Delivery, DeliveryTag, EventBus, LEASE_EXPIRED, NackOutcome, RetryPolicy,
};
pub use common::EventId;
pub use consumer::{Consumer, ConsumerError};
pub use error::{BusError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder};
pub use memory::InMemoryEventBus;
pub use postgres::PostgresEventBus;
pub use worker::{ConsumerWorker, DeliveryOutcome, WorkerStats};
