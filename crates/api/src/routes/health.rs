//! Health check endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use contracts::queues;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Messages waiting in each service queue.
    pub queues: BTreeMap<&'static str, usize>,
}

/// GET /health: returns system health and queue depths.
///
/// Fails with 500 when the bus cannot be read.
pub async fn check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let mut depths = BTreeMap::new();
    for (queue, _) in queues::BINDINGS {
        depths.insert(*queue, state.bus.pending_count(queue).await?);
    }

    Ok(Json(HealthResponse {
        status: "ok",
        queues: depths,
    }))
}
