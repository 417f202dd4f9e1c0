use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    Money, PaymentRequest, ProviderHandle, ProviderName, ProviderPaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use crate::payments::utils::{secure_eq, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

/// Pay-code provider: initiation returns a short code the passenger dials or
/// presents at an agent. Webhooks carry the shared secret in the `verif-hash`
/// header rather than a computed signature.
#[derive(Debug, Clone)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl FlutterwaveConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("FLUTTERWAVE_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "FLUTTERWAVE_SECRET_KEY environment variable is required".to_string(),
                field: Some("FLUTTERWAVE_SECRET_KEY".to_string()),
            })?;

        Ok(Self {
            secret_key,
            webhook_secret: std::env::var("FLUTTERWAVE_WEBHOOK_SECRET")
                .ok()
                .or_else(|| std::env::var("FLUTTERWAVE_WEBHOOK_HASH").ok()),
            base_url: std::env::var("FLUTTERWAVE_BASE_URL")
                .unwrap_or_else(|_| "https://api.flutterwave.com/v3".to_string()),
            timeout_secs: std::env::var("FLUTTERWAVE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("FLUTTERWAVE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        })
    }
}

pub struct FlutterwaveProvider {
    config: FlutterwaveConfig,
    http: PaymentHttpClient,
}

impl FlutterwaveProvider {
    pub fn new(config: FlutterwaveConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(FlutterwaveConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn map_status(status: &str) -> ProviderPaymentState {
        match status {
            "successful" | "success" => ProviderPaymentState::Success,
            "pending" => ProviderPaymentState::Pending,
            "failed" => ProviderPaymentState::Failed,
            "cancelled" => ProviderPaymentState::Cancelled,
            _ => ProviderPaymentState::Unknown,
        }
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle> {
        request.amount.validate_positive("amount")?;
        let phone = request
            .customer
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "customer.phone is required for a pay code charge".to_string(),
                field: Some("customer.phone".to_string()),
            })?;

        let payload = serde_json::json!({
            "tx_ref": request.transaction_reference,
            "amount": request.amount.amount,
            "currency": request.amount.currency,
            "phone_number": phone,
            "email": request.customer.email,
            "meta": request.metadata,
        });

        let raw: FlwEnvelope<FlwChargeData> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/charges?type=ussd"),
                Some(&self.config.secret_key),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if raw.status != "success" {
            return Err(PaymentError::ProviderError {
                provider: "flutterwave".to_string(),
                message: raw.message,
                provider_code: None,
                retryable: false,
            });
        }
        let data = raw.data;
        info!(flw_ref = %data.flw_ref, "flutterwave pay code issued");

        Ok(ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: request.transaction_reference,
            provider_reference: Some(data.flw_ref.clone()),
            payment_url: None,
            pay_code: data.payment_code.clone(),
            instruction: data
                .payment_code
                .as_deref()
                .map(|code| format!("Dial the code {} to authorize the charge", code)),
            provider_data: Some(serde_json::json!({ "flw_ref": data.flw_ref })),
        })
    }

    async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse> {
        let tx_ref = request
            .transaction_reference
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "transaction_reference is required".to_string(),
                field: Some("transaction_reference".to_string()),
            })?;

        let raw: FlwEnvelope<FlwVerifyData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!(
                    "/transactions/verify_by_reference?tx_ref={}",
                    tx_ref
                )),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;
        if raw.status != "success" {
            return Err(PaymentError::ProviderError {
                provider: "flutterwave".to_string(),
                message: raw.message,
                provider_code: None,
                retryable: false,
            });
        }

        Ok(StatusResponse {
            status: Self::map_status(&raw.data.status),
            transaction_reference: Some(tx_ref),
            provider_reference: Some(raw.data.flw_ref),
            amount: Some(Money {
                amount: raw.data.amount.to_string(),
                currency: raw.data.currency,
            }),
            timestamp: raw.data.created_at,
            failure_reason: raw.data.processor_response,
            provider_data: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Flutterwave
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["NGN", "KES", "GHS", "UGX", "TZS", "USD"]
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.secret_key);
        let valid = signature
            .map(|hash| secure_eq(hash.trim().as_bytes(), secret.as_bytes()))
            .unwrap_or(false);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("verif-hash header missing or mismatched".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookPayloadError {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let event_type = parsed
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let data = parsed.get("data");
        let tx_ref = data
            .and_then(|d| d.get("tx_ref"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let flw_ref = data
            .and_then(|d| d.get("flw_ref"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = data
            .and_then(|d| d.get("status"))
            .and_then(|v| v.as_str())
            .map(Self::map_status);

        Ok(WebhookEvent {
            provider: ProviderName::Flutterwave,
            event_type,
            transaction_reference: tx_ref,
            provider_reference: flw_ref,
            status,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FlwEnvelope<T> {
    status: String,
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct FlwChargeData {
    flw_ref: String,
    #[serde(default)]
    payment_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlwVerifyData {
    flw_ref: String,
    amount: f64,
    currency: String,
    status: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    processor_response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> FlutterwaveProvider {
        FlutterwaveProvider::new(FlutterwaveConfig {
            secret_key: "FLWSECK_TEST".to_string(),
            webhook_secret: Some("hook-secret".to_string()),
            base_url: "https://api.flutterwave.com/v3".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn shared_secret_header_must_match_exactly() {
        let provider = provider();
        let ok = provider
            .verify_webhook(b"{}", Some("hook-secret"))
            .expect("verification should not error");
        assert!(ok.valid);

        let bad = provider
            .verify_webhook(b"{}", Some("other"))
            .expect("verification should not error");
        assert!(!bad.valid);

        let missing = provider
            .verify_webhook(b"{}", None)
            .expect("verification should not error");
        assert!(!missing.valid);
    }

    #[test]
    fn webhook_event_extracts_tx_ref() {
        let provider = provider();
        let payload = br#"{
            "event": "charge.completed",
            "data": {"tx_ref": "bk_9", "flw_ref": "FLW-1", "status": "successful"}
        }"#;
        let event = provider
            .parse_webhook_event(payload)
            .expect("payload should parse");
        assert_eq!(event.transaction_reference.as_deref(), Some("bk_9"));
        assert_eq!(event.provider_reference.as_deref(), Some("FLW-1"));
        assert_eq!(event.status, Some(ProviderPaymentState::Success));
    }
}
