use crate::api::AppState;
use crate::booking::orchestrator::CreateBooking;
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBooking>,
) -> Result<impl IntoResponse, AppError> {
    info!(trip_id = %request.trip_id, seats = request.seats.len(), "booking requested");
    let receipt = state.orchestrator.create_booking(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// DELETE /bookings/{ticket_id}
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = state.orchestrator.cancel(ticket_id).await?;
    Ok(Json(serde_json::json!({
        "status": "cancelled",
        "ticket": ticket,
    })))
}
