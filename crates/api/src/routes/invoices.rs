//! Invoice endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use billing::{BillingStats, Invoice, NewInvoice, StateChange};
use common::{FarmerId, HarvestId, InvoiceId};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct InvoiceFilter {
    pub farmer_id: Option<String>,
}

/// GET /invoices[?farmer_id=]: newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let invoices = match filter.farmer_id.as_deref() {
        Some(raw) => {
            let farmer_id: FarmerId = parse_id(raw, "farmer")?;
            state.billing.list_invoices_by_farmer(farmer_id).await?
        }
        None => state.billing.list_invoices().await?,
    };
    Ok(Json(invoices))
}

/// POST /invoices: issues an invoice with an explicit unit price.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewInvoice>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let invoice = state.billing.create_invoice(req).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /invoices/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<BillingStats>, ApiError> {
    Ok(Json(state.billing.stats().await?))
}

/// GET /invoices/harvest/{harvest_id}
pub async fn by_harvest(
    State(state): State<Arc<AppState>>,
    Path(harvest_id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let harvest_id: HarvestId = parse_id(&harvest_id, "harvest")?;
    Ok(Json(state.billing.get_invoice_by_harvest(harvest_id).await?))
}

/// GET /invoices/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let id: InvoiceId = parse_id(&id, "invoice")?;
    Ok(Json(state.billing.get_invoice(id).await?))
}

/// DELETE /invoices/{id}: only while `PENDING`.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: InvoiceId = parse_id(&id, "invoice")?;
    state.billing.delete_invoice(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /invoices/{id}/state
#[tracing::instrument(skip(state, req))]
pub async fn change_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StateChange>,
) -> Result<Json<Invoice>, ApiError> {
    let id: InvoiceId = parse_id(&id, "invoice")?;
    Ok(Json(state.billing.change_state(id, req).await?))
}
