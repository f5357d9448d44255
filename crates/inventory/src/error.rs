use common::{ErrorKind, ItemId};
use event_bus::ConsumerError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the inventory ledger.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Inventory item not found: {0}")]
    ItemNotFound(ItemId),

    /// Names are unique ignoring case.
    #[error("An inventory item named '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Stock cannot be negative, got {0}")]
    NegativeStock(i64),

    #[error("Adjusting item {id} by {delta} would leave negative stock")]
    InsufficientStock { id: ItemId, delta: i64 },

    /// Stock, or the sum of all stock, left the `BIGINT` range.
    #[error("Stock out of range: {0}")]
    StockOutOfRange(String),

    #[error("Harvest quantity must be greater than zero, got {0}")]
    InvalidQuantity(Decimal),

    #[error("Harvest quantity {0} is too large to convert into stock units")]
    QuantityOutOfRange(Decimal),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl InventoryError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::ItemNotFound(_) => ErrorKind::NotFound,
            InventoryError::DuplicateName(_)
            | InventoryError::InsufficientStock { .. }
            | InventoryError::StockOutOfRange(_) => ErrorKind::Conflict,
            InventoryError::InvalidField { .. }
            | InventoryError::NegativeStock(_)
            | InventoryError::InvalidQuantity(_)
            | InventoryError::QuantityOutOfRange(_) => ErrorKind::Validation,
            InventoryError::Database(_) => ErrorKind::Storage,
        }
    }
}

impl From<InventoryError> for ConsumerError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Database(e) => ConsumerError::Storage(e.to_string()),
            other => ConsumerError::Other(other.to_string()),
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
