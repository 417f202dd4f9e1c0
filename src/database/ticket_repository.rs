use crate::booking::allocator::{AllocatorError, SeatRequest, SeatStore};
use crate::booking::{Ticket, TicketPaymentStatus, TicketStatus, Trip};
use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct TicketRow {
    id: Uuid,
    trip_id: Uuid,
    seat_number: i32,
    holder_name: String,
    holder_phone: String,
    ticket_status: String,
    payment_status: String,
    payment_ref: Option<String>,
    booking_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket, DatabaseError> {
        let ticket_status = TicketStatus::parse(&self.ticket_status).ok_or_else(|| {
            DatabaseError::decode(format!("unknown ticket status '{}'", self.ticket_status))
        })?;
        let payment_status = TicketPaymentStatus::parse(&self.payment_status).ok_or_else(|| {
            DatabaseError::decode(format!("unknown payment status '{}'", self.payment_status))
        })?;
        Ok(Ticket {
            id: self.id,
            trip_id: self.trip_id,
            seat_number: self.seat_number,
            holder_name: self.holder_name,
            holder_phone: self.holder_phone,
            ticket_status,
            payment_status,
            payment_ref: self.payment_ref,
            booking_id: self.booking_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const TICKET_COLUMNS: &str = "id, trip_id, seat_number, holder_name, holder_phone, \
                              ticket_status, payment_status, payment_ref, booking_id, \
                              created_at, updated_at";

const ACTIVE_STATUSES: &str = "('booked', 'confirmed', 'on_board')";

pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    /// One transaction per batch: the `FOR UPDATE` on the trip row serializes
    /// concurrent reservations for the same trip, so the conflict check and
    /// the inserts observe a stable view. The partial unique index on active
    /// tickets backstops the lock; a unique violation still maps to
    /// `SeatsTaken`.
    async fn reserve_seats(
        &self,
        trip: &Trip,
        booking_id: Uuid,
        requests: &[SeatRequest],
    ) -> Result<Vec<Ticket>, AllocatorError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query("SELECT id FROM trips WHERE id = $1 FOR UPDATE")
            .bind(trip.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let requested: Vec<i32> = requests.iter().map(|r| r.seat_number).collect();
        let mut conflicts: Vec<i32> = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT seat_number FROM tickets
             WHERE trip_id = $1 AND seat_number = ANY($2) AND ticket_status IN {ACTIVE_STATUSES}"
        ))
        .bind(trip.id)
        .bind(&requested)
        .fetch_all(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            conflicts.dedup();
            return Err(AllocatorError::SeatsTaken(conflicts));
        }

        let mut tickets = Vec::with_capacity(requests.len());
        for request in requests {
            let row = sqlx::query_as::<_, TicketRow>(&format!(
                "INSERT INTO tickets
                     (id, trip_id, seat_number, holder_name, holder_phone,
                      ticket_status, payment_status, booking_id)
                 VALUES ($1, $2, $3, $4, $5, 'booked', 'pending', $6)
                 RETURNING {TICKET_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(trip.id)
            .bind(request.seat_number)
            .bind(&request.holder_name)
            .bind(&request.holder_phone)
            .bind(booking_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                let db_error = DatabaseError::from_sqlx(e);
                if db_error.is_unique_violation() {
                    AllocatorError::SeatsTaken(vec![request.seat_number])
                } else {
                    AllocatorError::Storage(db_error)
                }
            })?;
            tickets.push(row.into_ticket()?);
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(tickets)
    }

    async fn taken_seats(&self, trip_id: Uuid) -> Result<Vec<i32>, AllocatorError> {
        let seats = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT seat_number FROM tickets
             WHERE trip_id = $1 AND ticket_status IN {ACTIVE_STATUSES}
             ORDER BY seat_number"
        ))
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(seats)
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, AllocatorError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(TicketRow::into_ticket)
            .transpose()
            .map_err(AllocatorError::from)
    }

    async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Ticket, AllocatorError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET ticket_status = 'cancelled', updated_at = NOW()
             WHERE id = $1
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or(AllocatorError::TicketNotFound(ticket_id))?;
        row.into_ticket().map_err(AllocatorError::from)
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<Vec<Ticket>, AllocatorError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets
             SET ticket_status = 'confirmed', payment_status = 'completed',
                 payment_ref = $2, updated_at = NOW()
             WHERE booking_id = $1 AND ticket_status = 'booked'
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(booking_id)
        .bind(payment_ref)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows.into_iter()
            .map(|r| r.into_ticket().map_err(AllocatorError::from))
            .collect()
    }

    async fn fail_booking_payment(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<Ticket>, AllocatorError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets
             SET payment_status = 'failed', updated_at = NOW()
             WHERE booking_id = $1 AND payment_status = 'pending'
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows.into_iter()
            .map(|r| r.into_ticket().map_err(AllocatorError::from))
            .collect()
    }
}
