//! Company subscriptions: the second consumer of completed payments. A
//! subscription row is created `pending` and only reconciliation activates
//! it, stamping the paid period.

use crate::database::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription '{0}' not found")]
    NotFound(Uuid),
    #[error("invalid subscription: {0}")]
    Invalid(String),
    #[error("subscription storage error: {0}")]
    Storage(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanySubscription {
    pub id: Uuid,
    pub company_id: Uuid,
    pub plan_id: String,
    pub duration_days: i32,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<CompanySubscription>, SubscriptionError>;

    async fn mark_active(
        &self,
        id: Uuid,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    ) -> Result<CompanySubscription, SubscriptionError>;
}

#[derive(Clone)]
pub struct SubscriptionActivation {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionActivation {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Activate once, dating the paid period from `paid_at`. Already-active
    /// subscriptions are returned unchanged; the ledger's idempotency means
    /// this path is only re-entered on operator replays.
    pub async fn activate(
        &self,
        subscription_id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> Result<CompanySubscription, SubscriptionError> {
        let subscription = self
            .store
            .find(subscription_id)
            .await?
            .ok_or(SubscriptionError::NotFound(subscription_id))?;

        match subscription.status {
            SubscriptionStatus::Active => Ok(subscription),
            SubscriptionStatus::Pending => {
                let starts_on = paid_at.date_naive();
                let ends_on = starts_on + Duration::days(subscription.duration_days as i64);
                let activated = self.store.mark_active(subscription_id, starts_on, ends_on).await?;
                info!(
                    subscription_id = %subscription_id,
                    plan_id = %activated.plan_id,
                    ends_on = %ends_on,
                    "subscription activated"
                );
                Ok(activated)
            }
            other => Err(SubscriptionError::Invalid(format!(
                "subscription is {} and cannot be activated",
                other.as_str()
            ))),
        }
    }
}
