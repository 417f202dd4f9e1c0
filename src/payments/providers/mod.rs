mod bank_transfer;
mod flutterwave;
mod mpesa;
mod mtn_momo;
mod paystack;

pub use bank_transfer::{BankTransferConfig, BankTransferProvider};
pub use flutterwave::{FlutterwaveConfig, FlutterwaveProvider};
pub use mpesa::{MpesaConfig, MpesaProvider};
pub use mtn_momo::{MtnMomoConfig, MtnMomoProvider};
pub use paystack::{PaystackConfig, PaystackProvider};
