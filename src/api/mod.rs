//! HTTP surface: bookings, trips, payments, webhooks and health.

pub mod bookings;
pub mod payments;
pub mod trips;
pub mod webhooks;

use crate::booking::orchestrator::BookingOrchestrator;
use crate::health::HealthChecker;
use crate::ledger::PaymentLedger;
use crate::reconciliation::ReconciliationEngine;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;

pub struct AppState {
    pub orchestrator: BookingOrchestrator,
    pub ledger: PaymentLedger,
    pub engine: ReconciliationEngine,
    pub health: HealthChecker,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/{ticket_id}", delete(bookings::cancel_booking))
        .route("/trips/{trip_id}/seats", get(trips::available_seats))
        .route("/payments/{transaction_ref}", get(payments::get_payment))
        .route("/webhooks/{provider}", post(webhooks::handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if matches!(status.status, crate::health::HealthState::Healthy) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}
