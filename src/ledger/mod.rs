//! Payment Ledger: the append-then-transition record of every payment
//! attempt. A ledger row is created `pending` before any provider I/O and
//! moves to exactly one terminal status, exactly once. The ledger never
//! performs side effects itself; fan-out on completion belongs to the
//! reconciliation engine.

use crate::database::DatabaseError;
use crate::payments::types::{PaymentMethod, ProviderName};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction reference '{0}' is already in use")]
    DuplicateTransactionRef(String),
    #[error("payment '{0}' not found")]
    NotFound(String),
    #[error("invalid payment: {0}")]
    Invalid(String),
    #[error("ledger storage error: {0}")]
    Storage(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(LedgerError::Invalid(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// The two one-way destinations of a pending payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Failed,
}

impl TerminalStatus {
    pub fn as_payment_status(&self) -> PaymentStatus {
        match self {
            TerminalStatus::Completed => PaymentStatus::Completed,
            TerminalStatus::Failed => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Ticket,
    Subscription,
    Topup,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Ticket => "ticket",
            PaymentType::Subscription => "subscription",
            PaymentType::Topup => "topup",
        }
    }

    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        match value {
            "ticket" => Ok(PaymentType::Ticket),
            "subscription" => Ok(PaymentType::Subscription),
            "topup" => Ok(PaymentType::Topup),
            other => Err(LedgerError::Invalid(format!(
                "unknown payment type '{}'",
                other
            ))),
        }
    }
}

/// What a completed payment pays for. Stored as JSONB; the tag keeps the
/// match in the reconciliation engine exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentContext {
    Ticket {
        booking_id: Uuid,
        ticket_ids: Vec<Uuid>,
    },
    Subscription {
        subscription_id: Uuid,
    },
    Topup {
        account_id: Uuid,
    },
}

impl PaymentContext {
    pub fn payment_type(&self) -> PaymentType {
        match self {
            PaymentContext::Ticket { .. } => PaymentType::Ticket,
            PaymentContext::Subscription { .. } => PaymentType::Subscription,
            PaymentContext::Topup { .. } => PaymentType::Topup,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub transaction_ref: String,
    pub payment_type: PaymentType,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub provider: ProviderName,
    pub status: PaymentStatus,
    pub context: PaymentContext,
    /// Provider-side correlation id (e.g. an STK push CheckoutRequestID),
    /// attached after initiation for providers whose callbacks do not echo
    /// our transaction reference.
    pub provider_ref: Option<String>,
    pub provider_metadata: Option<JsonValue>,
    pub owner_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub transaction_ref: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub provider: ProviderName,
    pub context: PaymentContext,
    pub owner_phone: Option<String>,
}

/// Result of a terminal transition attempt. Only `Applied` may trigger
/// downstream activation; `AlreadyProcessed` means some earlier delivery won.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Payment),
    AlreadyProcessed(Payment),
}

impl TransitionOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            TransitionOutcome::Applied(p) | TransitionOutcome::AlreadyProcessed(p) => p,
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new pending row. Must fail with `DuplicateTransactionRef`
    /// when the reference already exists, leaving the existing row untouched.
    async fn insert_pending(&self, payment: NewPayment) -> Result<Payment, LedgerError>;

    /// Move a pending payment to a terminal status. The update must be
    /// guarded on `status = pending` so concurrent deliveries of the same
    /// event resolve to exactly one `Applied`.
    async fn transition(
        &self,
        transaction_ref: &str,
        status: TerminalStatus,
        provider_metadata: Option<JsonValue>,
    ) -> Result<TransitionOutcome, LedgerError>;

    async fn find_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Payment>, LedgerError>;

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, LedgerError>;

    async fn attach_provider_ref(
        &self,
        transaction_ref: &str,
        provider_ref: &str,
    ) -> Result<(), LedgerError>;
}

#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn LedgerStore>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create_pending(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        if payment.transaction_ref.trim().is_empty() {
            return Err(LedgerError::Invalid(
                "transaction_ref must not be empty".to_string(),
            ));
        }
        if payment.amount <= BigDecimal::from(0) {
            return Err(LedgerError::Invalid(
                "amount must be greater than zero".to_string(),
            ));
        }
        let created = self.store.insert_pending(payment).await?;
        info!(
            tx_ref = %created.transaction_ref,
            payment_type = created.payment_type.as_str(),
            "payment ledger entry created"
        );
        Ok(created)
    }

    pub async fn transition(
        &self,
        transaction_ref: &str,
        status: TerminalStatus,
        provider_metadata: Option<JsonValue>,
    ) -> Result<TransitionOutcome, LedgerError> {
        let outcome = self
            .store
            .transition(transaction_ref, status, provider_metadata)
            .await?;
        match &outcome {
            TransitionOutcome::Applied(payment) => {
                info!(
                    tx_ref = %transaction_ref,
                    status = payment.status.as_str(),
                    "payment transitioned"
                );
            }
            TransitionOutcome::AlreadyProcessed(payment) => {
                info!(
                    tx_ref = %transaction_ref,
                    status = payment.status.as_str(),
                    "payment already in terminal status, transition skipped"
                );
            }
        }
        Ok(outcome)
    }

    pub async fn lookup(&self, transaction_ref: &str) -> Result<Payment, LedgerError> {
        self.store
            .find_by_transaction_ref(transaction_ref)
            .await?
            .ok_or_else(|| LedgerError::NotFound(transaction_ref.to_string()))
    }

    pub async fn find_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        self.store.find_by_transaction_ref(transaction_ref).await
    }

    pub async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        self.store.find_by_provider_ref(provider_ref).await
    }

    pub async fn attach_provider_ref(
        &self,
        transaction_ref: &str,
        provider_ref: &str,
    ) -> Result<(), LedgerError> {
        self.store
            .attach_provider_ref(transaction_ref, provider_ref)
            .await
    }
}
