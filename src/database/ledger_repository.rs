use crate::database::error::DatabaseError;
use crate::ledger::{
    LedgerError, LedgerStore, NewPayment, Payment, PaymentStatus, PaymentType, TerminalStatus,
    TransitionOutcome,
};
use crate::payments::types::{PaymentMethod, ProviderName};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    transaction_ref: String,
    payment_type: String,
    amount: BigDecimal,
    currency: String,
    payment_method: String,
    provider: String,
    status: String,
    context: JsonValue,
    provider_ref: Option<String>,
    provider_metadata: Option<JsonValue>,
    owner_phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, LedgerError> {
        let payment_type = PaymentType::parse(&self.payment_type)?;
        let status = PaymentStatus::parse(&self.status)?;
        let payment_method = PaymentMethod::from_str(&self.payment_method)
            .map_err(|_| decode(format!("unknown payment method '{}'", self.payment_method)))?;
        let provider = ProviderName::from_str(&self.provider)
            .map_err(|_| decode(format!("unknown provider '{}'", self.provider)))?;
        let context = serde_json::from_value(self.context)
            .map_err(|e| decode(format!("invalid payment context: {}", e)))?;
        Ok(Payment {
            id: self.id,
            transaction_ref: self.transaction_ref,
            payment_type,
            amount: self.amount,
            currency: self.currency,
            payment_method,
            provider,
            status,
            context,
            provider_ref: self.provider_ref,
            provider_metadata: self.provider_metadata,
            owner_phone: self.owner_phone,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode(message: String) -> LedgerError {
    LedgerError::Storage(DatabaseError::decode(message))
}

const PAYMENT_COLUMNS: &str = "id, transaction_ref, payment_type, amount, currency, \
                               payment_method, provider, status, context, provider_ref, \
                               provider_metadata, owner_phone, created_at, updated_at";

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_pending(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        let context = serde_json::to_value(&payment.context)
            .map_err(|e| decode(format!("unserializable payment context: {}", e)))?;
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments
                 (id, transaction_ref, payment_type, amount, currency,
                  payment_method, provider, status, context, owner_phone)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&payment.transaction_ref)
        .bind(payment.context.payment_type().as_str())
        .bind(&payment.amount)
        .bind(&payment.currency)
        .bind(payment.payment_method.as_str())
        .bind(payment.provider.as_str())
        .bind(context)
        .bind(&payment.owner_phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let db_error = DatabaseError::from_sqlx(e);
            if db_error.is_unique_violation() {
                LedgerError::DuplicateTransactionRef(payment.transaction_ref.clone())
            } else {
                LedgerError::Storage(db_error)
            }
        })?;
        row.into_payment()
    }

    /// Guarded terminal update: the `status = 'pending'` predicate makes
    /// concurrent deliveries of the same event race to a single winner.
    async fn transition(
        &self,
        transaction_ref: &str,
        status: TerminalStatus,
        provider_metadata: Option<JsonValue>,
    ) -> Result<TransitionOutcome, LedgerError> {
        let updated = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $2, provider_metadata = COALESCE($3, provider_metadata),
                 updated_at = NOW()
             WHERE transaction_ref = $1 AND status = 'pending'
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(transaction_ref)
        .bind(status.as_payment_status().as_str())
        .bind(provider_metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(DatabaseError::from_sqlx(e)))?;

        if let Some(row) = updated {
            return Ok(TransitionOutcome::Applied(row.into_payment()?));
        }

        // Zero rows: either the ref is unknown or the payment is already
        // terminal.
        match self.find_by_transaction_ref(transaction_ref).await? {
            Some(existing) => Ok(TransitionOutcome::AlreadyProcessed(existing)),
            None => Err(LedgerError::NotFound(transaction_ref.to_string())),
        }
    }

    async fn find_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_ref = $1"
        ))
        .bind(transaction_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(DatabaseError::from_sqlx(e)))?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_ref = $1"
        ))
        .bind(provider_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(DatabaseError::from_sqlx(e)))?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn attach_provider_ref(
        &self,
        transaction_ref: &str,
        provider_ref: &str,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE payments SET provider_ref = $2, updated_at = NOW()
             WHERE transaction_ref = $1",
        )
        .bind(transaction_ref)
        .bind(provider_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(DatabaseError::from_sqlx(e)))?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(transaction_ref.to_string()));
        }
        Ok(())
    }
}
