//! End-to-end booking and reconciliation flows over in-memory stores.

mod support;

use bigdecimal::BigDecimal;
use futures::future::join_all;
use safiri_backend::booking::allocator::AllocatorError;
use safiri_backend::booking::orchestrator::{BookingError, CreateBooking};
use safiri_backend::booking::{TicketPaymentStatus, TicketStatus};
use safiri_backend::ledger::{LedgerError, NewPayment, PaymentContext, PaymentStatus};
use safiri_backend::payments::types::{
    CustomerContact, PaymentMethod, ProviderName, ProviderPaymentState,
};
use safiri_backend::reconciliation::ReconciliationOutcome;
use support::{seat, stack, trip, ScriptedProvider, WEBHOOK_TOKEN};
use uuid::Uuid;

fn booking_request(trip_id: Uuid, seats: Vec<safiri_backend::booking::SeatRequest>) -> CreateBooking {
    CreateBooking {
        trip_id,
        seats,
        payment_method: PaymentMethod::MobileMoney,
        provider: None,
        payer: CustomerContact {
            phone: Some("254700001234".to_string()),
            email: None,
        },
    }
}

fn success_webhook(tx_ref: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "reference": tx_ref,
        "status": "success",
    }))
    .expect("serialize webhook")
}

/// Capacity-2 trip: rider A books seat 1, rider B loses the race for seat 1
/// but gets seat 2, A's webhook confirms the booking, and a replayed
/// delivery changes nothing.
#[tokio::test]
async fn full_booking_scenario() {
    let s = stack(ScriptedProvider::new());
    let trip = trip(2, 2000, 6);
    s.trips.insert(trip.clone()).await;

    let receipt_a = s
        .orchestrator
        .create_booking(booking_request(trip.id, vec![seat(1, "Amina W")]))
        .await
        .expect("rider A books seat 1");
    assert_eq!(receipt_a.status, "pending_payment");
    assert!(receipt_a.payment.instruction.is_some());

    let conflict = s
        .orchestrator
        .create_booking(booking_request(trip.id, vec![seat(1, "Brian O")]))
        .await
        .expect_err("seat 1 is taken");
    assert!(matches!(
        conflict,
        BookingError::Allocator(AllocatorError::SeatsTaken(ref seats)) if seats == &vec![1]
    ));

    s.orchestrator
        .create_booking(booking_request(trip.id, vec![seat(2, "Brian O")]))
        .await
        .expect("rider B books seat 2");

    // The bus is now full.
    let full = s
        .orchestrator
        .create_booking(booking_request(trip.id, vec![seat(1, "Cheru L")]))
        .await
        .expect_err("no seats left");
    assert!(matches!(
        full,
        BookingError::Allocator(AllocatorError::SeatsTaken(_))
    ));

    // Provider confirms rider A's payment.
    s.provider
        .script_verification(&receipt_a.payment_ref, ProviderPaymentState::Success, "2000")
        .await;
    let outcome = s
        .engine
        .process(
            &ProviderName::Mpesa,
            Some(WEBHOOK_TOKEN),
            &success_webhook(&receipt_a.payment_ref),
        )
        .await
        .expect("webhook processed");
    assert!(matches!(outcome, ReconciliationOutcome::Processed(_)));

    for ticket in &receipt_a.tickets {
        let stored = s.seats.ticket(ticket.id).await.expect("ticket exists");
        assert_eq!(stored.ticket_status, TicketStatus::Confirmed);
        assert_eq!(stored.payment_status, TicketPaymentStatus::Completed);
        assert_eq!(stored.payment_ref.as_deref(), Some(receipt_a.payment_ref.as_str()));
    }

    // Replay: acknowledged, nothing moves twice.
    let replay = s
        .engine
        .process(
            &ProviderName::Mpesa,
            Some(WEBHOOK_TOKEN),
            &success_webhook(&receipt_a.payment_ref),
        )
        .await
        .expect("replay acknowledged");
    assert!(matches!(replay, ReconciliationOutcome::AlreadyProcessed(_)));

    let payment = s
        .ledger
        .lookup(&receipt_a.payment_ref)
        .await
        .expect("ledger row");
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn concurrent_bookings_for_one_seat_have_one_winner() {
    let s = stack(ScriptedProvider::new());
    let trip = trip(40, 1500, 6);
    s.trips.insert(trip.clone()).await;

    let orchestrator = s.orchestrator.clone();
    let attempts = (0..10).map(|i| {
        let orchestrator = orchestrator.clone();
        let trip_id = trip.id;
        async move {
            orchestrator
                .create_booking(booking_request(
                    trip_id,
                    vec![seat(17, &format!("Rider {}", i))],
                ))
                .await
        }
    });
    let results = join_all(attempts).await;
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn batch_reservation_is_atomic() {
    let s = stack(ScriptedProvider::new());
    let trip = trip(40, 1500, 6);
    s.trips.insert(trip.clone()).await;

    s.orchestrator
        .create_booking(booking_request(trip.id, vec![seat(4, "Dalia M")]))
        .await
        .expect("seat 4 books");

    let err = s
        .orchestrator
        .create_booking(booking_request(
            trip.id,
            vec![seat(3, "Esi T"), seat(4, "Esi T"), seat(5, "Esi T")],
        ))
        .await
        .expect_err("batch with taken seat fails");
    assert!(matches!(
        err,
        BookingError::Allocator(AllocatorError::SeatsTaken(ref seats)) if seats == &vec![4]
    ));

    // Seats 3 and 5 were not reserved by the failed batch.
    let available = s
        .orchestrator
        .allocator()
        .available_seats(trip.id)
        .await
        .expect("availability");
    assert!(available.contains(&3));
    assert!(available.contains(&5));
}

#[tokio::test]
async fn duplicate_transaction_ref_is_rejected() {
    let s = stack(ScriptedProvider::new());
    let payment = NewPayment {
        transaction_ref: "bk_fixed".to_string(),
        amount: BigDecimal::from(1000),
        currency: "KES".to_string(),
        payment_method: PaymentMethod::MobileMoney,
        provider: ProviderName::Mpesa,
        context: PaymentContext::Topup {
            account_id: Uuid::new_v4(),
        },
        owner_phone: None,
    };
    let first = s
        .ledger
        .create_pending(payment.clone())
        .await
        .expect("first insert");

    let err = s
        .ledger
        .create_pending(payment)
        .await
        .expect_err("duplicate rejected");
    assert!(matches!(err, LedgerError::DuplicateTransactionRef(_)));

    let stored = s.ledger.lookup("bk_fixed").await.expect("row");
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn amount_mismatch_fails_payment_but_keeps_seat_booked() {
    let s = stack(ScriptedProvider::new());
    let trip = trip(40, 2000, 6);
    s.trips.insert(trip.clone()).await;

    let receipt = s
        .orchestrator
        .create_booking(booking_request(trip.id, vec![seat(8, "Farah N")]))
        .await
        .expect("booking");

    // Provider only saw 500 of the expected 2000.
    s.provider
        .script_verification(&receipt.payment_ref, ProviderPaymentState::Success, "500")
        .await;
    let outcome = s
        .engine
        .process(
            &ProviderName::Mpesa,
            Some(WEBHOOK_TOKEN),
            &success_webhook(&receipt.payment_ref),
        )
        .await
        .expect("processed as business failure");
    match outcome {
        ReconciliationOutcome::Processed(payment) => {
            assert_eq!(payment.status, PaymentStatus::Failed);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let ticket = s
        .seats
        .ticket(receipt.tickets[0].id)
        .await
        .expect("ticket exists");
    assert_eq!(ticket.ticket_status, TicketStatus::Booked);
    assert_eq!(ticket.payment_status, TicketPaymentStatus::Failed);
}

#[tokio::test]
async fn cancellation_rules_follow_departure_time() {
    let s = stack(ScriptedProvider::new());
    let upcoming = trip(40, 1500, 6);
    s.trips.insert(upcoming.clone()).await;

    let receipt = s
        .orchestrator
        .create_booking(booking_request(upcoming.id, vec![seat(12, "Gathoni P")]))
        .await
        .expect("booking");
    let ticket_id = receipt.tickets[0].id;

    s.orchestrator.cancel(ticket_id).await.expect("cancel ok");
    let available = s
        .orchestrator
        .allocator()
        .available_seats(upcoming.id)
        .await
        .expect("availability");
    assert!(available.contains(&12));

    // Departed trip: cancellation is rejected.
    let departed = trip(40, 1500, -2);
    s.trips.insert(departed.clone()).await;
    let tickets = {
        use safiri_backend::booking::allocator::SeatStore;
        s.seats
            .reserve_seats(&departed, Uuid::new_v4(), &[seat(3, "Hassan J")])
            .await
            .expect("seed ticket on departed trip")
    };
    let err = s
        .orchestrator
        .cancel(tickets[0].id)
        .await
        .expect_err("cannot cancel past trip");
    assert!(matches!(err, BookingError::PastDeparture));
}
