use crate::api::AppState;
use crate::error::AppError;
use crate::ledger::{Payment, PaymentContext};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub transaction_ref: String,
    pub status: &'static str,
    pub payment_type: &'static str,
    pub amount: String,
    pub currency: String,
    pub payment_method: &'static str,
    pub provider: &'static str,
    pub context: PaymentContext,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            transaction_ref: payment.transaction_ref,
            status: payment.status.as_str(),
            payment_type: payment.payment_type.as_str(),
            amount: payment.amount.to_string(),
            currency: payment.currency,
            payment_method: payment.payment_method.as_str(),
            provider: payment.provider.as_str(),
            context: payment.context,
        }
    }
}

/// GET /payments/{transaction_ref}
///
/// When the payment has an owner phone, the caller must present it in
/// `X-Holder-Phone`; a mismatch answers 403 without revealing the payment.
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(transaction_ref): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PaymentView>, AppError> {
    let payment = state.ledger.lookup(&transaction_ref).await?;

    if let Some(owner_phone) = &payment.owner_phone {
        let presented = headers
            .get("x-holder-phone")
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        if presented != Some(owner_phone.as_str()) {
            warn!(tx_ref = %transaction_ref, "payment status requested with wrong holder phone");
            return Err(AppError::forbidden("holder phone does not match"));
        }
    }

    Ok(Json(payment.into()))
}
