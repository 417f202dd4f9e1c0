//! Safiri backend: seat-inventory booking and webhook-driven payment
//! reconciliation for intercity trips.

pub mod api;
pub mod booking;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod ledger;
pub mod payments;
pub mod reconciliation;
pub mod subscriptions;
