use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    Money, PaymentRequest, ProviderHandle, ProviderName, ProviderPaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use crate::payments::utils::{verify_hmac_sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

/// Hosted-checkout provider: initiation returns an authorization URL the
/// passenger opens to complete payment. Webhooks are HMAC-SHA512 signed.
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaystackConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("PAYSTACK_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "PAYSTACK_SECRET_KEY environment variable is required".to_string(),
                field: Some("PAYSTACK_SECRET_KEY".to_string()),
            })?;

        Ok(Self {
            webhook_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: std::env::var("PAYSTACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PAYSTACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            secret_key,
        })
    }
}

pub struct PaystackProvider {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackProvider {
    pub fn new(config: PaystackConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(PaystackConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn ensure_status_ref(request: &StatusRequest) -> PaymentResult<String> {
        request
            .transaction_reference
            .clone()
            .or_else(|| request.provider_reference.clone())
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "transaction_reference or provider_reference is required".to_string(),
                field: Some("reference".to_string()),
            })
    }
}

#[async_trait]
impl PaymentProvider for PaystackProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle> {
        request.amount.validate_positive("amount")?;
        if request
            .customer
            .email
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty()
        {
            return Err(PaymentError::ValidationError {
                message: "customer.email is required for paystack initialization".to_string(),
                field: Some("customer.email".to_string()),
            });
        }

        let payload = serde_json::json!({
            "email": request.customer.email,
            "amount": request.amount.amount,
            "currency": request.amount.currency,
            "reference": request.transaction_reference,
            "callback_url": request.callback_url,
            "metadata": request.metadata,
        });

        let raw: PaystackEnvelope<PaystackInitializeData> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if !raw.status {
            return Err(PaymentError::ProviderError {
                provider: "paystack".to_string(),
                message: raw.message,
                provider_code: None,
                retryable: false,
            });
        }
        let data = raw.data;
        info!(reference = %data.reference, "paystack checkout initiated");

        Ok(ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: request.transaction_reference,
            provider_reference: Some(data.reference.clone()),
            payment_url: Some(data.authorization_url),
            pay_code: None,
            instruction: None,
            provider_data: Some(serde_json::json!({
                "access_code": data.access_code,
                "provider_reference": data.reference
            })),
        })
    }

    async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse> {
        let reference = Self::ensure_status_ref(&request)?;
        let raw: PaystackEnvelope<PaystackVerifyData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", reference)),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;
        if !raw.status {
            return Err(PaymentError::ProviderError {
                provider: "paystack".to_string(),
                message: raw.message,
                provider_code: None,
                retryable: false,
            });
        }

        let status = match raw.data.status.as_str() {
            "success" => ProviderPaymentState::Success,
            "pending" | "ongoing" => ProviderPaymentState::Pending,
            "failed" => ProviderPaymentState::Failed,
            "abandoned" | "reversed" => ProviderPaymentState::Cancelled,
            _ => ProviderPaymentState::Unknown,
        };

        Ok(StatusResponse {
            status,
            transaction_reference: request.transaction_reference,
            provider_reference: Some(reference),
            amount: Some(Money {
                amount: raw.data.amount.to_string(),
                currency: raw.data.currency,
            }),
            timestamp: raw.data.paid_at,
            failure_reason: raw.data.gateway_response,
            provider_data: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Paystack
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["NGN", "GHS", "ZAR", "KES", "USD"]
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        let Some(signature) = signature else {
            return Ok(WebhookVerificationResult {
                valid: false,
                reason: Some("missing x-paystack-signature header".to_string()),
            });
        };
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.secret_key);
        let valid = verify_hmac_sha512_hex(payload, secret, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid paystack signature".to_string())
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
        // Paystack echoes back the reference we passed at initialization.
        let tx_ref = parsed
            .get("data")
            .and_then(|v| v.get("reference"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = parsed
            .get("data")
            .and_then(|v| v.get("status"))
            .and_then(|v| v.as_str())
            .map(|v| match v {
                "success" => ProviderPaymentState::Success,
                "pending" => ProviderPaymentState::Pending,
                "failed" => ProviderPaymentState::Failed,
                _ => ProviderPaymentState::Unknown,
            });

        Ok(WebhookEvent {
            provider: ProviderName::Paystack,
            event_type,
            transaction_reference: tx_ref.clone(),
            provider_reference: tx_ref,
            status,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    amount: u64,
    currency: String,
    status: String,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}
