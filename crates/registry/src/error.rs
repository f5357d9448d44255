use common::{ErrorKind, FarmerId, HarvestId};
use contracts::ContractError;
use event_bus::{BusError, ConsumerError};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::HarvestState;

/// Errors raised by the harvest registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Harvest not found: {0}")]
    HarvestNotFound(HarvestId),

    #[error("Farmer not found: {0}")]
    FarmerNotFound(FarmerId),

    /// A harvest referenced a farmer that does not exist.
    #[error("Farmer {0} does not exist")]
    UnknownFarmer(FarmerId),

    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(Decimal),

    #[error(
        "Quantity {0} is out of range; it must be below 100000000000000 with at most 4 decimal places"
    )]
    QuantityOutOfRange(Decimal),

    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error(
        "Invalid harvest state '{0}'; expected one of REGISTERED, IN_PROCESS, INVOICED, COMPLETED"
    )]
    InvalidState(String),

    #[error("Cannot move harvest from {from} to {to}")]
    InvalidTransition { from: HarvestState, to: HarvestState },

    #[error("Harvest in state {0} has no next state")]
    NoSuccessor(HarvestState),

    #[error("Harvest {id} is {state}; only REGISTERED harvests can be deleted")]
    NotDeletable { id: HarvestId, state: HarvestState },

    #[error("Harvest {0} kept changing while being updated")]
    ConcurrentUpdate(HarvestId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Publish error: {0}")]
    Publish(#[from] BusError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
}

impl RegistryError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::HarvestNotFound(_) | RegistryError::FarmerNotFound(_) => {
                ErrorKind::NotFound
            }
            RegistryError::UnknownFarmer(_)
            | RegistryError::InvalidQuantity(_)
            | RegistryError::QuantityOutOfRange(_)
            | RegistryError::InvalidField { .. }
            | RegistryError::InvalidState(_)
            | RegistryError::InvalidTransition { .. }
            | RegistryError::NoSuccessor(_) => ErrorKind::Validation,
            RegistryError::NotDeletable { .. } | RegistryError::ConcurrentUpdate(_) => {
                ErrorKind::Conflict
            }
            RegistryError::Database(_) | RegistryError::Publish(_) => ErrorKind::Storage,
            RegistryError::Contract(e) => e.kind(),
        }
    }
}

impl From<RegistryError> for ConsumerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Database(e) => ConsumerError::Storage(e.to_string()),
            RegistryError::Publish(e) => ConsumerError::Publish(e),
            RegistryError::Contract(e) => e.into(),
            other => ConsumerError::Other(other.to_string()),
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
