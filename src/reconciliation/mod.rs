//! Webhook Reconciliation Engine. Every provider callback funnels through
//! `process`: authenticate, resolve the ledger row, cross-check claimed
//! success against the provider's verify endpoint, apply the idempotent
//! transition, then fan out activation exactly once.

use crate::booking::orchestrator::{BookingError, TicketActivation};
use crate::ledger::{
    LedgerError, Payment, PaymentContext, PaymentLedger, TerminalStatus, TransitionOutcome,
};
use crate::payments::error::PaymentError;
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{ProviderName, ProviderPaymentState, StatusRequest, WebhookEvent};
use crate::subscriptions::{SubscriptionActivation, SubscriptionError};
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// Signature/secret check failed; the ledger was not touched.
    #[error("webhook authentication failed: {0}")]
    AuthFailed(String),
    #[error("webhook carries no usable payment reference")]
    MissingReference,
    #[error("malformed webhook: {0}")]
    Malformed(PaymentError),
    /// The provider's verify endpoint could not be reached; respond 502 so
    /// the provider redelivers. Processing is safely re-invokable.
    #[error("provider verification unavailable: {0}")]
    VerificationUnavailable(PaymentError),
    #[error("provider not available: {0}")]
    Provider(PaymentError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("ticket activation failed: {0}")]
    TicketActivation(#[from] BookingError),
    #[error("subscription activation failed: {0}")]
    SubscriptionActivation(#[from] SubscriptionError),
}

impl ReconciliationError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            ReconciliationError::AuthFailed(_) => 401,
            ReconciliationError::MissingReference => 400,
            ReconciliationError::Malformed(_) => 400,
            ReconciliationError::VerificationUnavailable(_) => 502,
            ReconciliationError::Provider(_) => 400,
            ReconciliationError::Ledger(_)
            | ReconciliationError::TicketActivation(_)
            | ReconciliationError::SubscriptionActivation(_) => 500,
        }
    }
}

/// Every outcome here answers 200: the event was received and dealt with,
/// even when the business result is a failed payment or an unknown ref.
#[derive(Debug)]
pub enum ReconciliationOutcome {
    Processed(Payment),
    AlreadyProcessed(Payment),
    /// No ledger row for the reference. Acknowledged so the provider stops
    /// redelivering; logged for operators.
    UnknownReference(String),
    /// Event carried no terminal status (progress ping, unknown state).
    Ignored(String),
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    providers: Arc<PaymentProviderFactory>,
    ledger: PaymentLedger,
    tickets: TicketActivation,
    subscriptions: SubscriptionActivation,
}

impl ReconciliationEngine {
    pub fn new(
        providers: Arc<PaymentProviderFactory>,
        ledger: PaymentLedger,
        tickets: TicketActivation,
        subscriptions: SubscriptionActivation,
    ) -> Self {
        Self {
            providers,
            ledger,
            tickets,
            subscriptions,
        }
    }

    pub async fn process(
        &self,
        provider_name: &ProviderName,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let provider = self
            .providers
            .get_provider(provider_name)
            .map_err(ReconciliationError::Provider)?;

        let verification = provider
            .verify_webhook(body, signature)
            .map_err(ReconciliationError::Malformed)?;
        if !verification.valid {
            return Err(ReconciliationError::AuthFailed(
                verification
                    .reason
                    .unwrap_or_else(|| "signature mismatch".to_string()),
            ));
        }

        let event = provider
            .parse_webhook_event(body)
            .map_err(ReconciliationError::Malformed)?;

        let payment = match self.resolve(&event).await? {
            Some(payment) => payment,
            None => {
                let reference = event
                    .transaction_reference
                    .or(event.provider_reference)
                    .unwrap_or_default();
                warn!(provider = %provider_name, reference = %reference, "webhook for unknown payment");
                return Ok(ReconciliationOutcome::UnknownReference(reference));
            }
        };

        let claimed = match event.status {
            Some(ProviderPaymentState::Success) => TerminalStatus::Completed,
            Some(ProviderPaymentState::Failed) | Some(ProviderPaymentState::Cancelled) => {
                TerminalStatus::Failed
            }
            Some(ProviderPaymentState::Pending) | Some(ProviderPaymentState::Unknown) | None => {
                return Ok(ReconciliationOutcome::Ignored(
                    "event carries no terminal status".to_string(),
                ));
            }
        };

        let mut metadata = serde_json::json!({
            "event_type": event.event_type,
            "received_at": event.received_at,
            "webhook": event.payload,
        });

        // A claimed success is never trusted on the webhook's word alone
        // when the provider can be asked directly.
        let status = if claimed == TerminalStatus::Completed && provider.supports_verification() {
            match self.cross_check(provider.as_ref(), &payment).await? {
                CrossCheck::Confirmed => TerminalStatus::Completed,
                CrossCheck::Mismatch(detail) => {
                    warn!(tx_ref = %payment.transaction_ref, detail = %detail, "verification mismatch");
                    metadata["verification_mismatch"] = serde_json::json!(detail);
                    TerminalStatus::Failed
                }
                CrossCheck::StillPending => {
                    return Ok(ReconciliationOutcome::Ignored(
                        "provider still reports the payment pending".to_string(),
                    ));
                }
                CrossCheck::Unverifiable(reason) => {
                    warn!(
                        tx_ref = %payment.transaction_ref,
                        reason = %reason,
                        "payment cannot be verified, leaving it pending for operators"
                    );
                    return Ok(ReconciliationOutcome::Ignored(format!(
                        "verification not possible: {}",
                        reason
                    )));
                }
            }
        } else {
            claimed
        };

        let outcome = self
            .ledger
            .transition(&payment.transaction_ref, status, Some(metadata))
            .await?;

        match outcome {
            TransitionOutcome::Applied(payment) => {
                self.activate(&payment).await?;
                Ok(ReconciliationOutcome::Processed(payment))
            }
            TransitionOutcome::AlreadyProcessed(payment) => {
                Ok(ReconciliationOutcome::AlreadyProcessed(payment))
            }
        }
    }

    async fn resolve(&self, event: &WebhookEvent) -> Result<Option<Payment>, ReconciliationError> {
        if let Some(tx_ref) = event
            .transaction_reference
            .as_deref()
            .filter(|v| !v.trim().is_empty())
        {
            return Ok(self.ledger.find_by_transaction_ref(tx_ref).await?);
        }
        if let Some(provider_ref) = event
            .provider_reference
            .as_deref()
            .filter(|v| !v.trim().is_empty())
        {
            return Ok(self.ledger.find_by_provider_ref(provider_ref).await?);
        }
        Err(ReconciliationError::MissingReference)
    }

    async fn cross_check(
        &self,
        provider: &dyn PaymentProvider,
        payment: &Payment,
    ) -> Result<CrossCheck, ReconciliationError> {
        let status = match provider
            .verify_payment(StatusRequest {
                transaction_reference: Some(payment.transaction_ref.clone()),
                provider_reference: payment.provider_ref.clone(),
            })
            .await
        {
            Ok(status) => status,
            // Transport-level failures answer 502 so the provider redelivers.
            Err(e) if e.is_retryable() => {
                return Err(ReconciliationError::VerificationUnavailable(e));
            }
            // A permanent rejection (e.g. the provider reference was never
            // attached) would loop forever as a 502; acknowledge instead.
            Err(e) => return Ok(CrossCheck::Unverifiable(e.to_string())),
        };

        match status.status {
            ProviderPaymentState::Pending => return Ok(CrossCheck::StillPending),
            ProviderPaymentState::Success => {}
            other => {
                return Ok(CrossCheck::Mismatch(format!(
                    "webhook claimed success but provider reports {:?}",
                    other
                )));
            }
        }

        if let Some(reference) = &status.transaction_reference {
            if reference != &payment.transaction_ref {
                return Ok(CrossCheck::Mismatch(format!(
                    "provider reference '{}' does not match '{}'",
                    reference, payment.transaction_ref
                )));
            }
        }

        if let Some(money) = &status.amount {
            if !money.currency.eq_ignore_ascii_case(&payment.currency) {
                return Ok(CrossCheck::Mismatch(format!(
                    "currency {} does not match expected {}",
                    money.currency, payment.currency
                )));
            }
            match BigDecimal::from_str(&money.amount) {
                Ok(amount) if amount == payment.amount => {}
                Ok(amount) => {
                    return Ok(CrossCheck::Mismatch(format!(
                        "amount {} does not match expected {}",
                        amount, payment.amount
                    )));
                }
                Err(_) => {
                    return Ok(CrossCheck::Mismatch(format!(
                        "provider amount '{}' is not a number",
                        money.amount
                    )));
                }
            }
        }

        Ok(CrossCheck::Confirmed)
    }

    async fn activate(&self, payment: &Payment) -> Result<(), ReconciliationError> {
        match (payment.status, &payment.context) {
            (
                crate::ledger::PaymentStatus::Completed,
                PaymentContext::Ticket { booking_id, .. },
            ) => {
                self.tickets
                    .on_payment_completed(*booking_id, &payment.transaction_ref)
                    .await?;
            }
            (crate::ledger::PaymentStatus::Failed, PaymentContext::Ticket { booking_id, .. }) => {
                self.tickets.on_payment_failed(*booking_id).await?;
            }
            (
                crate::ledger::PaymentStatus::Completed,
                PaymentContext::Subscription { subscription_id },
            ) => {
                self.subscriptions
                    .activate(*subscription_id, Utc::now())
                    .await?;
            }
            (crate::ledger::PaymentStatus::Completed, PaymentContext::Topup { account_id }) => {
                // The ledger row itself is the credit record; wallet balances
                // are derived from completed topup rows.
                info!(account_id = %account_id, tx_ref = %payment.transaction_ref, "topup credited");
            }
            _ => {}
        }
        Ok(())
    }
}

enum CrossCheck {
    Confirmed,
    Mismatch(String),
    StillPending,
    Unverifiable(String),
}
