use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    Money, PaymentRequest, ProviderHandle, ProviderName, ProviderPaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use crate::payments::utils::secure_eq;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Manual bank-transfer provider. Initiation only hands back the settlement
/// account and the transaction reference to quote in the transfer narration;
/// confirmation arrives through the bank feed webhook. There is no pull
/// verification endpoint, so the push payload (authenticated by the feed
/// secret) is the only signal.
#[derive(Debug, Clone)]
pub struct BankTransferConfig {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub feed_secret: String,
}

impl BankTransferConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let bank_name = std::env::var("BANK_TRANSFER_BANK_NAME").unwrap_or_default();
        let account_number = std::env::var("BANK_TRANSFER_ACCOUNT_NUMBER").unwrap_or_default();
        let account_name = std::env::var("BANK_TRANSFER_ACCOUNT_NAME").unwrap_or_default();
        let feed_secret = std::env::var("BANK_TRANSFER_FEED_SECRET").unwrap_or_default();
        if bank_name.is_empty()
            || account_number.is_empty()
            || account_name.is_empty()
            || feed_secret.is_empty()
        {
            return Err(PaymentError::ValidationError {
                message: "BANK_TRANSFER_BANK_NAME, BANK_TRANSFER_ACCOUNT_NUMBER, \
                          BANK_TRANSFER_ACCOUNT_NAME and BANK_TRANSFER_FEED_SECRET are required"
                    .to_string(),
                field: Some("bank_transfer".to_string()),
            });
        }
        Ok(Self {
            bank_name,
            account_number,
            account_name,
            feed_secret,
        })
    }
}

pub struct BankTransferProvider {
    config: BankTransferConfig,
}

impl BankTransferProvider {
    pub fn new(config: BankTransferConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self::new(BankTransferConfig::from_env()?))
    }
}

#[async_trait]
impl PaymentProvider for BankTransferProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle> {
        request.amount.validate_positive("amount")?;

        Ok(ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: request.transaction_reference.clone(),
            provider_reference: None,
            payment_url: None,
            pay_code: None,
            instruction: Some(format!(
                "Transfer {} {} to {} account {} ({}) quoting reference {}",
                request.amount.amount,
                request.amount.currency,
                self.config.bank_name,
                self.config.account_number,
                self.config.account_name,
                request.transaction_reference,
            )),
            provider_data: None,
        })
    }

    async fn verify_payment(&self, _request: StatusRequest) -> PaymentResult<StatusResponse> {
        Err(PaymentError::ProviderError {
            provider: "bank_transfer".to_string(),
            message: "bank transfers have no verification endpoint".to_string(),
            provider_code: None,
            retryable: false,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::BankTransfer
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["KES", "UGX", "TZS", "NGN"]
    }

    fn supports_verification(&self) -> bool {
        false
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = signature
            .map(|token| secure_eq(token.trim().as_bytes(), self.config.feed_secret.as_bytes()))
            .unwrap_or(false);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("bank feed secret missing or mismatched".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookPayloadError {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let reference = parsed
            .get("reference")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = parsed
            .get("status")
            .and_then(|v| v.as_str())
            .map(|v| match v {
                "credited" | "settled" => ProviderPaymentState::Success,
                "returned" => ProviderPaymentState::Failed,
                _ => ProviderPaymentState::Unknown,
            });

        Ok(WebhookEvent {
            provider: ProviderName::BankTransfer,
            event_type: "bank_feed".to_string(),
            transaction_reference: reference,
            provider_reference: parsed
                .get("bank_reference")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
            status,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CustomerContact, PaymentMethod};

    fn provider() -> BankTransferProvider {
        BankTransferProvider::new(BankTransferConfig {
            bank_name: "Equity".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Safiri Ltd".to_string(),
            feed_secret: "feed-secret".to_string(),
        })
    }

    #[tokio::test]
    async fn initiation_yields_human_instruction() {
        let handle = provider()
            .initiate_payment(PaymentRequest {
                amount: Money {
                    amount: "4500".to_string(),
                    currency: "KES".to_string(),
                },
                customer: CustomerContact {
                    phone: None,
                    email: None,
                },
                payment_method: PaymentMethod::BankTransfer,
                callback_url: None,
                transaction_reference: "bk_7".to_string(),
                metadata: None,
            })
            .await
            .expect("initiation should succeed");
        let instruction = handle.instruction.expect("instruction present");
        assert!(instruction.contains("bk_7"));
        assert!(instruction.contains("0123456789"));
    }

    #[test]
    fn no_pull_verification() {
        assert!(!provider().supports_verification());
    }

    #[test]
    fn bank_feed_event_maps_credited_to_success() {
        let event = provider()
            .parse_webhook_event(br#"{"reference":"bk_7","status":"credited","amount":"4500"}"#)
            .expect("payload should parse");
        assert_eq!(event.transaction_reference.as_deref(), Some("bk_7"));
        assert_eq!(event.status, Some(ProviderPaymentState::Success));
    }
}
