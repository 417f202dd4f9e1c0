use crate::api::AppState;
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

/// GET /trips/{trip_id}/seats
pub async fn available_seats(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let seats = state
        .orchestrator
        .allocator()
        .available_seats(trip_id)
        .await?;
    Ok(Json(serde_json::json!({
        "trip_id": trip_id,
        "available_seats": seats,
    })))
}
