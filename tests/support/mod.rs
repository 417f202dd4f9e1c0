//! Shared test doubles: in-memory stores mirroring the Postgres contracts
//! and a scriptable payment provider.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use safiri_backend::booking::allocator::{AllocatorError, SeatRequest, SeatStore, TripStore};
use safiri_backend::booking::{Ticket, TicketPaymentStatus, TicketStatus, Trip};
use safiri_backend::ledger::{
    LedgerError, LedgerStore, NewPayment, Payment, PaymentStatus, TerminalStatus,
    TransitionOutcome,
};
use safiri_backend::payments::error::{PaymentError, PaymentResult};
use safiri_backend::payments::provider::PaymentProvider;
use safiri_backend::payments::types::{
    PaymentRequest, ProviderHandle, ProviderName, ProviderPaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use safiri_backend::subscriptions::{
    CompanySubscription, SubscriptionError, SubscriptionStatus, SubscriptionStore,
};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const WEBHOOK_TOKEN: &str = "test-callback-token";

pub fn trip(capacity: i32, price: i64, departs_in_hours: i64) -> Trip {
    let now = Utc::now();
    Trip {
        id: Uuid::new_v4(),
        route: "Nairobi-Kisumu".to_string(),
        capacity,
        price: BigDecimal::from(price),
        currency: "KES".to_string(),
        departure_time: now + chrono::Duration::hours(departs_in_hours),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn seat(n: i32, holder: &str) -> SeatRequest {
    SeatRequest {
        seat_number: n,
        holder_name: holder.to_string(),
        holder_phone: format!("25470000{:04}", n),
    }
}

#[derive(Default)]
pub struct FakeTripStore {
    trips: Mutex<HashMap<Uuid, Trip>>,
}

impl FakeTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, trip: Trip) {
        self.trips.lock().await.insert(trip.id, trip);
    }
}

#[async_trait]
impl TripStore for FakeTripStore {
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, AllocatorError> {
        Ok(self.trips.lock().await.get(&trip_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeSeatStore {
    tickets: Mutex<HashMap<Uuid, Ticket>>,
}

impl FakeSeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ticket(&self, ticket_id: Uuid) -> Option<Ticket> {
        self.tickets.lock().await.get(&ticket_id).cloned()
    }
}

#[async_trait]
impl SeatStore for FakeSeatStore {
    async fn reserve_seats(
        &self,
        trip: &Trip,
        booking_id: Uuid,
        requests: &[SeatRequest],
    ) -> Result<Vec<Ticket>, AllocatorError> {
        let mut tickets = self.tickets.lock().await;
        let taken: HashSet<i32> = tickets
            .values()
            .filter(|t| t.trip_id == trip.id && t.ticket_status.is_active())
            .map(|t| t.seat_number)
            .collect();
        let mut conflicts: Vec<i32> = requests
            .iter()
            .map(|r| r.seat_number)
            .filter(|s| taken.contains(s))
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            return Err(AllocatorError::SeatsTaken(conflicts));
        }
        let now = Utc::now();
        let created: Vec<Ticket> = requests
            .iter()
            .map(|r| Ticket {
                id: Uuid::new_v4(),
                trip_id: trip.id,
                seat_number: r.seat_number,
                holder_name: r.holder_name.clone(),
                holder_phone: r.holder_phone.clone(),
                ticket_status: TicketStatus::Booked,
                payment_status: TicketPaymentStatus::Pending,
                payment_ref: None,
                booking_id,
                created_at: now,
                updated_at: now,
            })
            .collect();
        for ticket in &created {
            tickets.insert(ticket.id, ticket.clone());
        }
        Ok(created)
    }

    async fn taken_seats(&self, trip_id: Uuid) -> Result<Vec<i32>, AllocatorError> {
        let mut seats: Vec<i32> = self
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| t.trip_id == trip_id && t.ticket_status.is_active())
            .map(|t| t.seat_number)
            .collect();
        seats.sort_unstable();
        Ok(seats)
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, AllocatorError> {
        Ok(self.tickets.lock().await.get(&ticket_id).cloned())
    }

    async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Ticket, AllocatorError> {
        let mut tickets = self.tickets.lock().await;
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or(AllocatorError::TicketNotFound(ticket_id))?;
        ticket.ticket_status = TicketStatus::Cancelled;
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<Vec<Ticket>, AllocatorError> {
        let mut tickets = self.tickets.lock().await;
        let mut confirmed = Vec::new();
        for ticket in tickets
            .values_mut()
            .filter(|t| t.booking_id == booking_id && t.ticket_status == TicketStatus::Booked)
        {
            ticket.ticket_status = TicketStatus::Confirmed;
            ticket.payment_status = TicketPaymentStatus::Completed;
            ticket.payment_ref = Some(payment_ref.to_string());
            ticket.updated_at = Utc::now();
            confirmed.push(ticket.clone());
        }
        Ok(confirmed)
    }

    async fn fail_booking_payment(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<Ticket>, AllocatorError> {
        let mut tickets = self.tickets.lock().await;
        let mut updated = Vec::new();
        for ticket in tickets.values_mut().filter(|t| t.booking_id == booking_id) {
            ticket.payment_status = TicketPaymentStatus::Failed;
            ticket.updated_at = Utc::now();
            updated.push(ticket.clone());
        }
        Ok(updated)
    }
}

#[derive(Default)]
pub struct FakeLedgerStore {
    rows: Mutex<HashMap<String, Payment>>,
}

impl FakeLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for FakeLedgerStore {
    async fn insert_pending(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&payment.transaction_ref) {
            return Err(LedgerError::DuplicateTransactionRef(payment.transaction_ref));
        }
        let now = Utc::now();
        let row = Payment {
            id: Uuid::new_v4(),
            transaction_ref: payment.transaction_ref.clone(),
            payment_type: payment.context.payment_type(),
            amount: payment.amount,
            currency: payment.currency,
            payment_method: payment.payment_method,
            provider: payment.provider,
            status: PaymentStatus::Pending,
            context: payment.context,
            provider_ref: None,
            provider_metadata: None,
            owner_phone: payment.owner_phone,
            created_at: now,
            updated_at: now,
        };
        rows.insert(row.transaction_ref.clone(), row.clone());
        Ok(row)
    }

    async fn transition(
        &self,
        transaction_ref: &str,
        status: TerminalStatus,
        provider_metadata: Option<JsonValue>,
    ) -> Result<TransitionOutcome, LedgerError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(transaction_ref)
            .ok_or_else(|| LedgerError::NotFound(transaction_ref.to_string()))?;
        if row.status != PaymentStatus::Pending {
            return Ok(TransitionOutcome::AlreadyProcessed(row.clone()));
        }
        row.status = status.as_payment_status();
        if provider_metadata.is_some() {
            row.provider_metadata = provider_metadata;
        }
        row.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(row.clone()))
    }

    async fn find_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        Ok(self.rows.lock().await.get(transaction_ref).cloned())
    }

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .find(|p| p.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn attach_provider_ref(
        &self,
        transaction_ref: &str,
        provider_ref: &str,
    ) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(transaction_ref)
            .ok_or_else(|| LedgerError::NotFound(transaction_ref.to_string()))?;
        row.provider_ref = Some(provider_ref.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSubscriptionStore {
    rows: Mutex<HashMap<Uuid, CompanySubscription>>,
}

impl FakeSubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, subscription: CompanySubscription) {
        self.rows.lock().await.insert(subscription.id, subscription);
    }

    pub async fn get(&self, id: Uuid) -> Option<CompanySubscription> {
        self.rows.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl SubscriptionStore for FakeSubscriptionStore {
    async fn find(&self, id: Uuid) -> Result<Option<CompanySubscription>, SubscriptionError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn mark_active(
        &self,
        id: Uuid,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    ) -> Result<CompanySubscription, SubscriptionError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(SubscriptionError::NotFound(id))?;
        row.status = SubscriptionStatus::Active;
        row.starts_on = Some(starts_on);
        row.ends_on = Some(ends_on);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

/// Webhook-and-verify provider whose pull verification answers from a
/// per-reference script. Unscripted references verify as successful with
/// the amount the webhook reported.
pub struct ScriptedProvider {
    /// tx_ref -> (state, amount) returned by `verify_payment`.
    verifications: Mutex<HashMap<String, (ProviderPaymentState, String)>>,
    pub supports_verification: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            verifications: Mutex::new(HashMap::new()),
            supports_verification: true,
        }
    }

    pub async fn script_verification(&self, tx_ref: &str, state: ProviderPaymentState, amount: &str) {
        self.verifications
            .lock()
            .await
            .insert(tx_ref.to_string(), (state, amount.to_string()));
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle> {
        Ok(ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: request.transaction_reference.clone(),
            provider_reference: Some(format!("prov_{}", request.transaction_reference)),
            payment_url: None,
            pay_code: None,
            instruction: Some("approve the payment prompt".to_string()),
            provider_data: None,
        })
    }

    async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse> {
        let tx_ref = request.transaction_reference.clone().unwrap_or_default();
        let scripted = self.verifications.lock().await.get(&tx_ref).cloned();
        let (state, amount) = scripted.ok_or(PaymentError::NetworkError {
            message: "no verification scripted".to_string(),
        })?;
        Ok(StatusResponse {
            status: state,
            transaction_reference: Some(tx_ref),
            provider_reference: request.provider_reference,
            amount: Some(safiri_backend::payments::types::Money {
                amount,
                currency: "KES".to_string(),
            }),
            timestamp: None,
            failure_reason: None,
            provider_data: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Mpesa
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["KES"]
    }

    fn supports_verification(&self) -> bool {
        self.supports_verification
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = signature == Some(WEBHOOK_TOKEN);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("callback token mismatch".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookPayloadError {
                message: e.to_string(),
            }
        })?;
        let status = parsed
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| match s {
                "success" => ProviderPaymentState::Success,
                "failed" => ProviderPaymentState::Failed,
                "pending" => ProviderPaymentState::Pending,
                _ => ProviderPaymentState::Unknown,
            });
        Ok(WebhookEvent {
            provider: ProviderName::Mpesa,
            event_type: "payment".to_string(),
            transaction_reference: parsed
                .get("reference")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
            provider_reference: parsed
                .get("provider_reference")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
            status,
            payload: parsed,
            received_at: Utc::now().to_rfc3339(),
        })
    }
}

pub struct TestStack {
    pub trips: Arc<FakeTripStore>,
    pub seats: Arc<FakeSeatStore>,
    pub ledger: safiri_backend::ledger::PaymentLedger,
    pub subscriptions: Arc<FakeSubscriptionStore>,
    pub provider: Arc<ScriptedProvider>,
    pub orchestrator: safiri_backend::booking::orchestrator::BookingOrchestrator,
    pub engine: safiri_backend::reconciliation::ReconciliationEngine,
}

pub fn stack(provider: ScriptedProvider) -> TestStack {
    use safiri_backend::booking::orchestrator::{BookingOrchestrator, TicketActivation};
    use safiri_backend::ledger::PaymentLedger;
    use safiri_backend::payments::factory::{PaymentFactoryConfig, PaymentProviderFactory};
    use safiri_backend::reconciliation::ReconciliationEngine;
    use safiri_backend::subscriptions::SubscriptionActivation;

    let trips = Arc::new(FakeTripStore::new());
    let seats = Arc::new(FakeSeatStore::new());
    let subscriptions = Arc::new(FakeSubscriptionStore::new());
    let ledger = PaymentLedger::new(Arc::new(FakeLedgerStore::new()));
    let provider = Arc::new(provider);

    let factory = Arc::new(PaymentProviderFactory::with_providers(
        PaymentFactoryConfig {
            default_provider: ProviderName::Mpesa,
            enabled_providers: vec![ProviderName::Mpesa],
        },
        vec![provider.clone() as Arc<dyn PaymentProvider>],
    ));

    let orchestrator = BookingOrchestrator::new(
        trips.clone(),
        seats.clone(),
        ledger.clone(),
        factory.clone(),
        Some("https://api.test/webhooks".to_string()),
    );
    let engine = ReconciliationEngine::new(
        factory,
        ledger.clone(),
        TicketActivation::new(seats.clone()),
        SubscriptionActivation::new(subscriptions.clone()),
    );

    TestStack {
        trips,
        seats,
        ledger,
        subscriptions,
        provider,
        orchestrator,
        engine,
    }
}
