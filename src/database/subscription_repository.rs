use crate::database::error::DatabaseError;
use crate::subscriptions::{
    CompanySubscription, SubscriptionError, SubscriptionStatus, SubscriptionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    company_id: Uuid,
    plan_id: String,
    duration_days: i32,
    starts_on: Option<NaiveDate>,
    ends_on: Option<NaiveDate>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<CompanySubscription, SubscriptionError> {
        let status = match self.status.as_str() {
            "pending" => SubscriptionStatus::Pending,
            "active" => SubscriptionStatus::Active,
            "expired" => SubscriptionStatus::Expired,
            "cancelled" => SubscriptionStatus::Cancelled,
            other => {
                return Err(SubscriptionError::Storage(DatabaseError::decode(format!(
                    "unknown subscription status '{}'",
                    other
                ))));
            }
        };
        Ok(CompanySubscription {
            id: self.id,
            company_id: self.company_id,
            plan_id: self.plan_id,
            duration_days: self.duration_days,
            starts_on: self.starts_on,
            ends_on: self.ends_on,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, company_id, plan_id, duration_days, starts_on, ends_on, \
                                    status, created_at, updated_at";

pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_pending(
        &self,
        company_id: Uuid,
        plan_id: &str,
        duration_days: i32,
    ) -> Result<CompanySubscription, SubscriptionError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "INSERT INTO company_subscriptions (id, company_id, plan_id, duration_days, status)
             VALUES ($1, $2, $3, $4, 'pending')
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(plan_id)
        .bind(duration_days)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.into_subscription()
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find(&self, id: Uuid) -> Result<Option<CompanySubscription>, SubscriptionError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM company_subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(SubscriptionRow::into_subscription).transpose()
    }

    async fn mark_active(
        &self,
        id: Uuid,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    ) -> Result<CompanySubscription, SubscriptionError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE company_subscriptions
             SET status = 'active', starts_on = $2, ends_on = $3, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id)
        .bind(starts_on)
        .bind(ends_on)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or(SubscriptionError::NotFound(id))?;
        row.into_subscription()
    }
}
