use crate::booking::allocator::{AllocatorError, TripStore};
use crate::booking::Trip;
use crate::database::error::DatabaseError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct TripRow {
    id: Uuid,
    route: String,
    capacity: i32,
    price: BigDecimal,
    currency: String,
    departure_time: DateTime<Utc>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: row.id,
            route: row.route,
            capacity: row.capacity,
            price: row.price,
            currency: row.currency,
            departure_time: row.departure_time,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TRIP_COLUMNS: &str =
    "id, route, capacity, price, currency, departure_time, is_active, created_at, updated_at";

pub struct PgTripStore {
    pool: PgPool,
}

impl PgTripStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Seed a trip. Used by operations tooling and integration tests; trips
    /// are not managed over the HTTP surface.
    pub async fn insert_trip(
        &self,
        route: &str,
        capacity: i32,
        price: &BigDecimal,
        currency: &str,
        departure_time: DateTime<Utc>,
    ) -> Result<Trip, DatabaseError> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "INSERT INTO trips (id, route, capacity, price, currency, departure_time, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, true)
             RETURNING {TRIP_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(route)
        .bind(capacity)
        .bind(price)
        .bind(currency)
        .bind(departure_time)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(row.into())
    }

    pub async fn set_active(&self, trip_id: Uuid, is_active: bool) -> Result<Trip, DatabaseError> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "UPDATE trips SET is_active = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {TRIP_COLUMNS}"
        ))
        .bind(trip_id)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(row.into())
    }
}

#[async_trait]
impl TripStore for PgTripStore {
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, AllocatorError> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"
        ))
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(Trip::from))
    }
}
