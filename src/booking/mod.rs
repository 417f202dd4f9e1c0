//! Seat inventory and booking lifecycle: trips, tickets, the atomic seat
//! allocator and the orchestrator that ties allocation to payment initiation.

pub mod allocator;
pub mod orchestrator;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use allocator::{AllocatorError, Reservation, SeatAllocator, SeatRequest, SeatStore, TripStore};
pub use orchestrator::{
    BookingError, BookingOrchestrator, BookingReceipt, CreateBooking, TicketActivation,
};

#[derive(Debug, Clone, Serialize)]
pub struct Trip {
    pub id: Uuid,
    pub route: String,
    pub capacity: i32,
    pub price: BigDecimal,
    pub currency: String,
    pub departure_time: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a ticket. `Booked`, `Confirmed` and `OnBoard` are the
/// *active* statuses: a seat with an active ticket cannot be sold again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Booked,
    Confirmed,
    OnBoard,
    Completed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Booked => "booked",
            TicketStatus::Confirmed => "confirmed",
            TicketStatus::OnBoard => "on_board",
            TicketStatus::Completed => "completed",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TicketStatus::Booked | TicketStatus::Confirmed | TicketStatus::OnBoard
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "booked" => Some(TicketStatus::Booked),
            "confirmed" => Some(TicketStatus::Confirmed),
            "on_board" => Some(TicketStatus::OnBoard),
            "completed" => Some(TicketStatus::Completed),
            "cancelled" => Some(TicketStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TicketPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPaymentStatus::Pending => "pending",
            TicketPaymentStatus::Completed => "completed",
            TicketPaymentStatus::Failed => "failed",
            TicketPaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TicketPaymentStatus::Pending),
            "completed" => Some(TicketPaymentStatus::Completed),
            "failed" => Some(TicketPaymentStatus::Failed),
            "refunded" => Some(TicketPaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_number: i32,
    pub holder_name: String,
    pub holder_phone: String,
    pub ticket_status: TicketStatus,
    pub payment_status: TicketPaymentStatus,
    pub payment_ref: Option<String>,
    pub booking_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
