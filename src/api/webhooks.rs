use crate::api::AppState;
use crate::error::AppError;
use crate::payments::types::ProviderName;
use crate::reconciliation::ReconciliationOutcome;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Header each provider signs (or authenticates) its callbacks with.
fn signature_header(provider: &ProviderName) -> &'static str {
    match provider {
        ProviderName::Mpesa => "x-callback-token",
        ProviderName::MtnMomo => "x-callback-token",
        ProviderName::Paystack => "x-paystack-signature",
        ProviderName::Flutterwave => "verif-hash",
        ProviderName::BankTransfer => "x-feed-secret",
    }
}

/// POST /webhooks/{provider}
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provider = match ProviderName::from_str(&provider) {
        Ok(provider) => provider,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "unknown provider"})),
            )
                .into_response();
        }
    };
    info!(provider = %provider, bytes = body.len(), "webhook received");

    let signature = headers
        .get(signature_header(&provider))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match state
        .engine
        .process(&provider, signature.as_deref(), &body)
        .await
    {
        Ok(outcome) => {
            let status = match &outcome {
                ReconciliationOutcome::Processed(payment) => {
                    info!(tx_ref = %payment.transaction_ref, "webhook processed");
                    "processed"
                }
                ReconciliationOutcome::AlreadyProcessed(payment) => {
                    info!(tx_ref = %payment.transaction_ref, "webhook already processed");
                    "already_processed"
                }
                ReconciliationOutcome::UnknownReference(_) => "unknown_reference",
                ReconciliationOutcome::Ignored(_) => "ignored",
            };
            (StatusCode::OK, Json(serde_json::json!({"status": status}))).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}
