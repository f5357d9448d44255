//! Farmer endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::FarmerId;
use registry::{Farmer, FarmerDetails};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

/// GET /farmers
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Farmer>>, ApiError> {
    Ok(Json(state.harvests.list_farmers().await?))
}

/// POST /farmers
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FarmerDetails>,
) -> Result<(StatusCode, Json<Farmer>), ApiError> {
    let farmer = state.harvests.create_farmer(req).await?;
    Ok((StatusCode::CREATED, Json(farmer)))
}

/// GET /farmers/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Farmer>, ApiError> {
    let id: FarmerId = parse_id(&id, "farmer")?;
    Ok(Json(state.harvests.get_farmer(id).await?))
}

/// PUT /farmers/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<FarmerDetails>,
) -> Result<Json<Farmer>, ApiError> {
    let id: FarmerId = parse_id(&id, "farmer")?;
    Ok(Json(state.harvests.update_farmer(id, req).await?))
}

/// DELETE /farmers/{id}
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: FarmerId = parse_id(&id, "farmer")?;
    state.harvests.delete_farmer(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
