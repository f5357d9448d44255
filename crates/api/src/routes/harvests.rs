//! Harvest endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{FarmerId, HarvestId};
use registry::{Harvest, HarvestUpdate, NewHarvest};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HarvestFilter {
    pub farmer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStateRequest {
    pub state: String,
}

/// GET /harvests[?farmer_id=]: newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<HarvestFilter>,
) -> Result<Json<Vec<Harvest>>, ApiError> {
    let harvests = match filter.farmer_id.as_deref() {
        Some(raw) => {
            let farmer_id: FarmerId = parse_id(raw, "farmer")?;
            state.harvests.list_harvests_by_farmer(farmer_id).await?
        }
        None => state.harvests.list_harvests().await?,
    };
    Ok(Json(harvests))
}

/// POST /harvests: registers a harvest and publishes `HarvestCreated`.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewHarvest>,
) -> Result<(StatusCode, Json<Harvest>), ApiError> {
    let harvest = state.harvests.create_harvest(req).await?;
    Ok((StatusCode::CREATED, Json(harvest)))
}

/// GET /harvests/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Harvest>, ApiError> {
    let id: HarvestId = parse_id(&id, "harvest")?;
    Ok(Json(state.harvests.get_harvest(id).await?))
}

/// PUT /harvests/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<HarvestUpdate>,
) -> Result<Json<Harvest>, ApiError> {
    let id: HarvestId = parse_id(&id, "harvest")?;
    Ok(Json(state.harvests.update_harvest(id, req).await?))
}

/// DELETE /harvests/{id}: only while `REGISTERED`.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: HarvestId = parse_id(&id, "harvest")?;
    state.harvests.delete_harvest(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /harvests/{id}/state
#[tracing::instrument(skip(state, req))]
pub async fn change_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeStateRequest>,
) -> Result<Json<Harvest>, ApiError> {
    let id: HarvestId = parse_id(&id, "harvest")?;
    Ok(Json(state.harvests.change_state(id, &req.state).await?))
}

/// POST /harvests/{id}/advance
#[tracing::instrument(skip(state))]
pub async fn advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Harvest>, ApiError> {
    let id: HarvestId = parse_id(&id, "harvest")?;
    Ok(Json(state.harvests.advance(id).await?))
}
