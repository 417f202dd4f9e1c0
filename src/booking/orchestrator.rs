//! Booking Orchestrator: reserve seats, open a pending ledger entry, then
//! initiate the charge with the chosen provider. Confirmation never happens
//! here; it arrives later through webhook reconciliation.

use crate::booking::allocator::{SeatAllocator, SeatRequest, SeatStore, TripStore};
use crate::booking::Ticket;
use crate::ledger::{LedgerError, NewPayment, PaymentContext, PaymentLedger};
use crate::payments::error::PaymentError;
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::{
    CustomerContact, Money, PaymentMethod, PaymentRequest, ProviderHandle, ProviderName,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use crate::booking::allocator::AllocatorError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Allocator(#[from] AllocatorError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("payment initiation failed: {0}")]
    Gateway(#[from] PaymentError),
    #[error("Cannot cancel booking for past trip")]
    PastDeparture,
    #[error("ticket '{0}' is no longer active")]
    TicketNotActive(Uuid),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub trip_id: Uuid,
    pub seats: Vec<SeatRequest>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub provider: Option<ProviderName>,
    pub payer: CustomerContact,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub tickets: Vec<Ticket>,
    pub payment_ref: String,
    pub status: &'static str,
    pub payment: ProviderHandle,
}

#[derive(Clone)]
pub struct BookingOrchestrator {
    allocator: SeatAllocator,
    trips: Arc<dyn TripStore>,
    seats: Arc<dyn SeatStore>,
    ledger: PaymentLedger,
    providers: Arc<PaymentProviderFactory>,
    /// Base URL advertised to providers for their callbacks, e.g.
    /// `https://api.example.com/webhooks`.
    webhook_base_url: Option<String>,
}

impl BookingOrchestrator {
    pub fn new(
        trips: Arc<dyn TripStore>,
        seats: Arc<dyn SeatStore>,
        ledger: PaymentLedger,
        providers: Arc<PaymentProviderFactory>,
        webhook_base_url: Option<String>,
    ) -> Self {
        Self {
            allocator: SeatAllocator::new(trips.clone(), seats.clone()),
            trips,
            seats,
            ledger,
            providers,
            webhook_base_url,
        }
    }

    pub fn allocator(&self) -> &SeatAllocator {
        &self.allocator
    }

    pub async fn create_booking(
        &self,
        request: CreateBooking,
    ) -> Result<BookingReceipt, BookingError> {
        let booking_id = Uuid::new_v4();
        let reservation = self
            .allocator
            .reserve(request.trip_id, booking_id, &request.seats)
            .await?;

        let trip = &reservation.trip;
        let seat_count = BigDecimal::from(reservation.tickets.len() as i64);
        let amount = &trip.price * &seat_count;
        let transaction_ref = format!("bk_{}", Uuid::new_v4().simple());
        let ticket_ids: Vec<Uuid> = reservation.tickets.iter().map(|t| t.id).collect();

        let provider = match &request.provider {
            Some(name) => self.providers.get_provider(name)?,
            None => self.providers.get_default_provider()?,
        };

        self.ledger
            .create_pending(NewPayment {
                transaction_ref: transaction_ref.clone(),
                amount: amount.clone(),
                currency: trip.currency.clone(),
                payment_method: request.payment_method.clone(),
                provider: provider.name(),
                context: PaymentContext::Ticket {
                    booking_id,
                    ticket_ids,
                },
                owner_phone: request.payer.phone.clone(),
            })
            .await?;

        // Provider I/O happens after the reservation transaction committed
        // and outside any database lock.
        let callback_url = self
            .webhook_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), provider.name()));
        let handle = provider
            .initiate_payment(PaymentRequest {
                amount: Money::new(&amount, &trip.currency),
                customer: request.payer.clone(),
                payment_method: request.payment_method.clone(),
                callback_url,
                transaction_reference: transaction_ref.clone(),
                metadata: Some(serde_json::json!({
                    "booking_id": booking_id,
                    "trip_id": trip.id,
                    "route": trip.route,
                })),
            })
            .await?;

        if let Some(provider_ref) = &handle.provider_reference {
            if let Err(e) = self
                .ledger
                .attach_provider_ref(&transaction_ref, provider_ref)
                .await
            {
                warn!(tx_ref = %transaction_ref, error = %e, "failed to record provider reference");
            }
        }

        info!(
            booking_id = %booking_id,
            tx_ref = %transaction_ref,
            provider = %provider.name(),
            seats = reservation.tickets.len(),
            "booking created, awaiting payment"
        );

        Ok(BookingReceipt {
            booking_id,
            tickets: reservation.tickets,
            payment_ref: transaction_ref,
            status: "pending_payment",
            payment: handle,
        })
    }

    /// Cancel a single ticket, freeing its seat. Only allowed before the
    /// trip departs; the payment row is left untouched.
    pub async fn cancel(&self, ticket_id: Uuid) -> Result<Ticket, BookingError> {
        let ticket = self
            .seats
            .find_ticket(ticket_id)
            .await?
            .ok_or(AllocatorError::TicketNotFound(ticket_id))?;
        if !ticket.ticket_status.is_active() {
            return Err(BookingError::TicketNotActive(ticket_id));
        }
        let trip = self
            .trips
            .find_trip(ticket.trip_id)
            .await?
            .ok_or(AllocatorError::TripNotFound(ticket.trip_id))?;
        if Utc::now() >= trip.departure_time {
            return Err(BookingError::PastDeparture);
        }
        let cancelled = self.seats.cancel_ticket(ticket_id).await?;
        info!(ticket_id = %ticket_id, trip_id = %trip.id, "ticket cancelled");
        Ok(cancelled)
    }
}

/// Ticket-side fan-out invoked by the reconciliation engine on the first
/// terminal transition of a booking's payment.
#[derive(Clone)]
pub struct TicketActivation {
    seats: Arc<dyn SeatStore>,
}

impl TicketActivation {
    pub fn new(seats: Arc<dyn SeatStore>) -> Self {
        Self { seats }
    }

    pub async fn on_payment_completed(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<Vec<Ticket>, BookingError> {
        let confirmed = self.seats.confirm_booking(booking_id, payment_ref).await?;
        info!(
            booking_id = %booking_id,
            tx_ref = %payment_ref,
            tickets = confirmed.len(),
            "booking confirmed"
        );
        Ok(confirmed)
    }

    pub async fn on_payment_failed(&self, booking_id: Uuid) -> Result<Vec<Ticket>, BookingError> {
        let updated = self.seats.fail_booking_payment(booking_id).await?;
        info!(booking_id = %booking_id, "booking payment failed, seats stay held");
        Ok(updated)
    }
}
