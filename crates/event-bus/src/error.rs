use thiserror::Error;

use crate::DeliveryTag;

/// Errors that can occur when interacting with the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The queue was never declared with `bind`.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// The delivery is not (or no longer) leased on this queue.
    #[error("Unknown delivery {tag} on queue {queue}")]
    UnknownDelivery { queue: String, tag: DeliveryTag },

    /// An envelope was built without a required field.
    #[error("Envelope is missing required field: {0}")]
    MissingField(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
