use async_trait::async_trait;
use thiserror::Error;

use crate::{BusError, EventEnvelope};

/// Failure of a consumer to handle a message.
///
/// The worker treats every variant as retryable: the delivery is nacked
/// and comes back with backoff until the queue's attempt budget runs out.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The payload does not match the contract for its event type.
    #[error("Cannot decode {event_type}: {reason}")]
    Decode { event_type: String, reason: String },

    /// The consumer's own store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A follow-up event could not be published.
    #[error("Publish error: {0}")]
    Publish(#[from] BusError),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// A handler for the messages of one queue.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// The queue this consumer drains.
    fn queue(&self) -> &'static str;

    /// Event types bound to the queue.
    fn event_types(&self) -> Vec<&'static str>;

    /// Handles one message.
    ///
    /// Must be idempotent: the same envelope may be handled more than once.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError>;
}
