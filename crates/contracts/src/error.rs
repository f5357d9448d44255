use common::ErrorKind;
use event_bus::{BusError, ConsumerError};
use thiserror::Error;

/// Errors raised while encoding or decoding an integration event.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract is known for the envelope's event type.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The envelope carries a different event than the one requested.
    #[error("Expected event type {expected}, got {actual}")]
    WrongEventType {
        expected: &'static str,
        actual: String,
    },

    /// The payload was written with a newer schema than this build knows.
    #[error("Unsupported schema version {version} for {event_type} (supported up to {supported})")]
    UnsupportedVersion {
        event_type: String,
        version: u16,
        supported: u16,
    },

    /// The payload does not match the contract.
    #[error("Invalid {event_type} payload: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The contract could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The envelope could not be built.
    #[error("Envelope error: {0}")]
    Envelope(#[from] BusError),
}

impl ContractError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Envelope(_) | ContractError::Serialization(_) => ErrorKind::Storage,
            _ => ErrorKind::Validation,
        }
    }
}

impl From<ContractError> for ConsumerError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::UnknownEventType(ref event_type)
            | ContractError::UnsupportedVersion { ref event_type, .. }
            | ContractError::InvalidPayload { ref event_type, .. } => ConsumerError::Decode {
                event_type: event_type.clone(),
                reason: err.to_string(),
            },
            ContractError::WrongEventType { ref actual, .. } => ConsumerError::Decode {
                event_type: actual.clone(),
                reason: err.to_string(),
            },
            ContractError::Serialization(e) => ConsumerError::Other(e.to_string()),
            ContractError::Envelope(e) => ConsumerError::Publish(e),
        }
    }
}
