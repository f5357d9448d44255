//! Dead-letter inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use event_bus::DeadLetter;

use crate::AppState;
use crate::error::ApiError;

/// GET /bus/queues/{queue}/dead-letters
pub async fn dead_letters(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<DeadLetter>>, ApiError> {
    Ok(Json(state.bus.dead_letters(&queue).await?))
}
