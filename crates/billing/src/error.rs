use common::{ErrorKind, HarvestId, InvoiceId};
use contracts::ContractError;
use event_bus::{BusError, ConsumerError};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::InvoiceState;

/// Errors raised by the billing ledger.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    #[error("No invoice exists for harvest {0}")]
    NoInvoiceForHarvest(HarvestId),

    /// The harvest already has an invoice.
    #[error("An invoice already exists for harvest {0}")]
    DuplicateInvoice(HarvestId),

    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(Decimal),

    #[error(
        "Quantity {0} is out of range; it must be below 100000000000000 with at most 4 decimal places"
    )]
    QuantityOutOfRange(Decimal),

    #[error("Unit price must be greater than zero, got {0}")]
    InvalidPrice(Decimal),

    #[error(
        "Unit price {0} is out of range; it must be below 10000000000000000 with at most 2 decimal places"
    )]
    PriceOutOfRange(Decimal),

    /// The invoice amounts for this quantity and price cannot be represented.
    #[error("Invoice amount for {quantity} x {unit_price} is out of range")]
    AmountOutOfRange {
        quantity: Decimal,
        unit_price: Decimal,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Invalid invoice state '{0}'; expected one of PENDING, PAID, VOIDED")]
    InvalidState(String),

    #[error("Cannot move invoice from {from} to {to}")]
    InvalidTransition { from: InvoiceState, to: InvoiceState },

    #[error("Invoice {id} is {state}; only PENDING invoices can be deleted")]
    NotDeletable { id: InvoiceId, state: InvoiceState },

    #[error("Invoice {0} changed while being updated")]
    ConcurrentUpdate(InvoiceId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Publish error: {0}")]
    Publish(#[from] BusError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
}

impl BillingError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::InvoiceNotFound(_) | BillingError::NoInvoiceForHarvest(_) => {
                ErrorKind::NotFound
            }
            BillingError::InvalidQuantity(_)
            | BillingError::QuantityOutOfRange(_)
            | BillingError::InvalidPrice(_)
            | BillingError::PriceOutOfRange(_)
            | BillingError::AmountOutOfRange { .. }
            | BillingError::InvalidField { .. }
            | BillingError::InvalidState(_)
            | BillingError::InvalidTransition { .. } => ErrorKind::Validation,
            BillingError::DuplicateInvoice(_)
            | BillingError::NotDeletable { .. }
            | BillingError::ConcurrentUpdate(_) => ErrorKind::Conflict,
            BillingError::Database(_) | BillingError::Publish(_) => ErrorKind::Storage,
            BillingError::Contract(e) => e.kind(),
        }
    }
}

impl From<BillingError> for ConsumerError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Database(e) => ConsumerError::Storage(e.to_string()),
            BillingError::Publish(e) => ConsumerError::Publish(e),
            BillingError::Contract(e) => e.into(),
            other => ConsumerError::Other(other.to_string()),
        }
    }
}

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;
