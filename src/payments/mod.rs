//! Payment Gateway Adapter layer: one uniform trait over the mobile-money,
//! pay-code, hosted-checkout and bank-transfer providers.

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;
