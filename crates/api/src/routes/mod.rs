//! HTTP handlers, one module per resource.

pub mod bus;
pub mod farmers;
pub mod harvests;
pub mod health;
pub mod inventory;
pub mod invoices;
pub mod metrics;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a UUID-backed identifier from a path segment or query value.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID format: {e}")))
}
