use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Mpesa,
    MtnMomo,
    Paystack,
    Flutterwave,
    BankTransfer,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Mpesa => "mpesa",
            ProviderName::MtnMomo => "mtn_momo",
            ProviderName::Paystack => "paystack",
            ProviderName::Flutterwave => "flutterwave",
            ProviderName::BankTransfer => "bank_transfer",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mpesa" | "m-pesa" => Ok(ProviderName::Mpesa),
            "mtn_momo" | "mtn-momo" | "momo" => Ok(ProviderName::MtnMomo),
            "paystack" => Ok(ProviderName::Paystack),
            "flutterwave" => Ok(ProviderName::Flutterwave),
            "bank_transfer" | "bank-transfer" => Ok(ProviderName::BankTransfer),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

impl Money {
    pub fn new(amount: &BigDecimal, currency: &str) -> Self {
        Self {
            amount: amount.to_string(),
            currency: currency.to_string(),
        }
    }

    pub fn as_decimal(&self) -> Result<BigDecimal, PaymentError> {
        BigDecimal::from_str(&self.amount).map_err(|_| PaymentError::ValidationError {
            message: format!("invalid decimal amount: {}", self.amount),
            field: Some("amount".to_string()),
        })
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        let parsed = self.as_decimal().map_err(|_| PaymentError::ValidationError {
            message: format!("invalid decimal amount: {}", self.amount),
            field: Some(field.to_string()),
        })?;
        if parsed <= BigDecimal::from(0) {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
    BankTransfer,
    PayCode,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::PayCode => "pay_code",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "card" => Ok(PaymentMethod::Card),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "pay_code" => Ok(PaymentMethod::PayCode),
            "other" => Ok(PaymentMethod::Other),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported payment method: {}", value),
                field: Some("payment_method".to_string()),
            }),
        }
    }
}

/// Provider-side view of a payment attempt. Distinct from the ledger's
/// status: only the reconciliation engine maps one onto the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPaymentState {
    Pending,
    Success,
    Failed,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    pub customer: CustomerContact,
    pub payment_method: PaymentMethod,
    pub callback_url: Option<String>,
    pub transaction_reference: String,
    pub metadata: Option<JsonValue>,
}

/// What the client needs to complete payment out-of-band: a checkout URL,
/// a pay code, or a human instruction, depending on the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHandle {
    pub status: ProviderPaymentState,
    pub transaction_reference: String,
    pub provider_reference: Option<String>,
    pub payment_url: Option<String>,
    pub pay_code: Option<String>,
    pub instruction: Option<String>,
    pub provider_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub transaction_reference: Option<String>,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ProviderPaymentState,
    pub transaction_reference: Option<String>,
    pub provider_reference: Option<String>,
    pub amount: Option<Money>,
    pub timestamp: Option<String>,
    pub failure_reason: Option<String>,
    pub provider_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: ProviderName,
    pub event_type: String,
    pub transaction_reference: Option<String>,
    pub provider_reference: Option<String>,
    pub status: Option<ProviderPaymentState>,
    pub payload: JsonValue,
    pub received_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_round_trips() {
        for name in [
            ProviderName::Mpesa,
            ProviderName::MtnMomo,
            ProviderName::Paystack,
            ProviderName::Flutterwave,
            ProviderName::BankTransfer,
        ] {
            let parsed = ProviderName::from_str(name.as_str()).expect("should parse");
            assert_eq!(parsed, name);
        }
        assert!(ProviderName::from_str("cash").is_err());
    }

    #[test]
    fn money_validation_rejects_non_positive_amounts() {
        let zero = Money {
            amount: "0".to_string(),
            currency: "KES".to_string(),
        };
        assert!(zero.validate_positive("amount").is_err());

        let negative = Money {
            amount: "-10.50".to_string(),
            currency: "KES".to_string(),
        };
        assert!(negative.validate_positive("amount").is_err());

        let ok = Money {
            amount: "1500.00".to_string(),
            currency: "KES".to_string(),
        };
        assert!(ok.validate_positive("amount").is_ok());
    }

    #[test]
    fn money_validation_requires_currency() {
        let missing = Money {
            amount: "100".to_string(),
            currency: " ".to_string(),
        };
        assert!(missing.validate_positive("amount").is_err());
    }

    #[test]
    fn provider_handle_serializes_to_json() {
        let handle = ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: "bk_1".to_string(),
            provider_reference: Some("ps_ref_1".to_string()),
            payment_url: Some("https://checkout.example.com/x".to_string()),
            pay_code: None,
            instruction: None,
            provider_data: None,
        };
        let json = serde_json::to_value(&handle).expect("serialization should succeed");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["transaction_reference"], "bk_1");
    }
}
