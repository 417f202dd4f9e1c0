//! Seat Inventory Allocator. Reservation of a batch of seats is all-or-
//! nothing; the store contract serializes concurrent writers per trip so two
//! requests for the same seat resolve to exactly one winner.

use crate::booking::{Ticket, Trip};
use crate::database::DatabaseError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("trip '{0}' not found")]
    TripNotFound(Uuid),
    #[error("trip '{0}' is not open for booking")]
    TripInactive(Uuid),
    #[error("seat {seat} is out of range for a trip with capacity {capacity}")]
    SeatOutOfRange { seat: i32, capacity: i32 },
    #[error("seats already taken: {0:?}")]
    SeatsTaken(Vec<i32>),
    #[error("invalid seat request: {0}")]
    InvalidRequest(String),
    #[error("ticket '{0}' not found")]
    TicketNotFound(Uuid),
    #[error("seat storage error: {0}")]
    Storage(#[from] DatabaseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeatRequest {
    pub seat_number: i32,
    pub holder_name: String,
    pub holder_phone: String,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub trip: Trip,
    pub tickets: Vec<Ticket>,
}

#[async_trait]
pub trait TripStore: Send + Sync {
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, AllocatorError>;
}

/// Ticket persistence. `reserve_seats` must run as one unit: lock the trip,
/// check the requested seats against active tickets, insert the whole batch
/// or nothing. Implementations back this with a `FOR UPDATE` trip lock plus
/// a partial unique index over active tickets.
#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn reserve_seats(
        &self,
        trip: &Trip,
        booking_id: Uuid,
        requests: &[SeatRequest],
    ) -> Result<Vec<Ticket>, AllocatorError>;

    /// Seat numbers currently held by active tickets.
    async fn taken_seats(&self, trip_id: Uuid) -> Result<Vec<i32>, AllocatorError>;

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, AllocatorError>;

    async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Ticket, AllocatorError>;

    /// Mark every ticket of the booking confirmed/paid and stamp the
    /// payment reference.
    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<Vec<Ticket>, AllocatorError>;

    /// Mark the booking's tickets as payment-failed; seats stay held.
    async fn fail_booking_payment(&self, booking_id: Uuid)
        -> Result<Vec<Ticket>, AllocatorError>;
}

/// Pure batch validation: non-empty, pairwise distinct, within 1..=capacity.
pub fn validate_requests(capacity: i32, requests: &[SeatRequest]) -> Result<(), AllocatorError> {
    if requests.is_empty() {
        return Err(AllocatorError::InvalidRequest(
            "at least one seat is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for request in requests {
        if request.seat_number < 1 || request.seat_number > capacity {
            return Err(AllocatorError::SeatOutOfRange {
                seat: request.seat_number,
                capacity,
            });
        }
        if !seen.insert(request.seat_number) {
            return Err(AllocatorError::InvalidRequest(format!(
                "seat {} requested more than once",
                request.seat_number
            )));
        }
        if request.holder_name.trim().is_empty() {
            return Err(AllocatorError::InvalidRequest(
                "holder_name must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct SeatAllocator {
    trips: Arc<dyn TripStore>,
    seats: Arc<dyn SeatStore>,
}

impl SeatAllocator {
    pub fn new(trips: Arc<dyn TripStore>, seats: Arc<dyn SeatStore>) -> Self {
        Self { trips, seats }
    }

    pub async fn reserve(
        &self,
        trip_id: Uuid,
        booking_id: Uuid,
        requests: &[SeatRequest],
    ) -> Result<Reservation, AllocatorError> {
        let trip = self
            .trips
            .find_trip(trip_id)
            .await?
            .ok_or(AllocatorError::TripNotFound(trip_id))?;
        if !trip.is_active {
            return Err(AllocatorError::TripInactive(trip_id));
        }
        validate_requests(trip.capacity, requests)?;

        let tickets = self.seats.reserve_seats(&trip, booking_id, requests).await?;
        info!(
            trip_id = %trip_id,
            booking_id = %booking_id,
            seats = tickets.len(),
            "seats reserved"
        );
        Ok(Reservation { trip, tickets })
    }

    pub async fn available_seats(&self, trip_id: Uuid) -> Result<Vec<i32>, AllocatorError> {
        let trip = self
            .trips
            .find_trip(trip_id)
            .await?
            .ok_or(AllocatorError::TripNotFound(trip_id))?;
        let taken: HashSet<i32> = self.seats.taken_seats(trip_id).await?.into_iter().collect();
        Ok((1..=trip.capacity).filter(|s| !taken.contains(s)).collect())
    }
}
