//! Inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::ItemId;
use inventory::{InventoryItem, InventoryStats, ItemUpdate, NewItem};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

/// GET /inventory/items[?category=]: ordered by name.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CategoryFilter>,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    let items = match filter.category.as_deref() {
        Some(category) => state.inventory.list_by_category(category).await?,
        None => state.inventory.list_items().await?,
    };
    Ok(Json(items))
}

/// POST /inventory/items
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewItem>,
) -> Result<(StatusCode, Json<InventoryItem>), ApiError> {
    let item = state.inventory.create_item(req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /inventory/items/low-stock[?limit=]
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    Ok(Json(state.inventory.low_stock(query.limit).await?))
}

/// GET /inventory/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<InventoryStats>, ApiError> {
    Ok(Json(state.inventory.stats().await?))
}

/// GET /inventory/items/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InventoryItem>, ApiError> {
    let id: ItemId = parse_id(&id, "item")?;
    Ok(Json(state.inventory.get_item(id).await?))
}

/// PUT /inventory/items/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ItemUpdate>,
) -> Result<Json<InventoryItem>, ApiError> {
    let id: ItemId = parse_id(&id, "item")?;
    Ok(Json(state.inventory.update_item(id, req).await?))
}

/// DELETE /inventory/items/{id}
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ItemId = parse_id(&id, "item")?;
    state.inventory.delete_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /inventory/items/{id}/stock
#[tracing::instrument(skip(state, req))]
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<InventoryItem>, ApiError> {
    let id: ItemId = parse_id(&id, "item")?;
    Ok(Json(state.inventory.set_stock(id, req.stock).await?))
}

/// POST /inventory/items/{id}/adjust: adds a signed delta; never below zero.
#[tracing::instrument(skip(state, req))]
pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<InventoryItem>, ApiError> {
    let id: ItemId = parse_id(&id, "item")?;
    Ok(Json(state.inventory.adjust_stock(id, req.delta).await?))
}
