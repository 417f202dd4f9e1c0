use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    Money, PaymentRequest, ProviderHandle, ProviderName, ProviderPaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use crate::payments::utils::{secure_eq, PaymentHttpClient};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Mobile-money provider (MTN MoMo collections). A request-to-pay is keyed
/// by a caller-generated `X-Reference-Id`; the `externalId` field echoes our
/// transaction reference back in callbacks and status queries.
#[derive(Debug, Clone)]
pub struct MtnMomoConfig {
    pub api_user: String,
    pub api_key: String,
    pub subscription_key: String,
    pub callback_secret: String,
    pub target_environment: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl MtnMomoConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let api_user = std::env::var("MOMO_API_USER").unwrap_or_default();
        let api_key = std::env::var("MOMO_API_KEY").unwrap_or_default();
        let subscription_key = std::env::var("MOMO_SUBSCRIPTION_KEY").unwrap_or_default();
        let callback_secret = std::env::var("MOMO_CALLBACK_SECRET").unwrap_or_default();
        if api_user.is_empty()
            || api_key.is_empty()
            || subscription_key.is_empty()
            || callback_secret.is_empty()
        {
            return Err(PaymentError::ValidationError {
                message: "MOMO_API_USER, MOMO_API_KEY, MOMO_SUBSCRIPTION_KEY and \
                          MOMO_CALLBACK_SECRET are required"
                    .to_string(),
                field: Some("mtn_momo".to_string()),
            });
        }
        Ok(Self {
            api_user,
            api_key,
            subscription_key,
            callback_secret,
            target_environment: std::env::var("MOMO_TARGET_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".to_string()),
            base_url: std::env::var("MOMO_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.momodeveloper.mtn.com".to_string()),
            timeout_secs: std::env::var("MOMO_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("MOMO_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        })
    }
}

pub struct MtnMomoProvider {
    config: MtnMomoConfig,
    http: PaymentHttpClient,
}

impl MtnMomoProvider {
    pub fn new(config: MtnMomoConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MtnMomoConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn access_token(&self) -> PaymentResult<String> {
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.config.api_user, self.config.api_key));
        let raw: MomoTokenResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/collection/token/"),
                None,
                None,
                &[
                    ("Authorization", &format!("Basic {}", basic)),
                    ("Ocp-Apim-Subscription-Key", &self.config.subscription_key),
                ],
            )
            .await?;
        Ok(raw.access_token)
    }

    fn map_status(status: &str) -> ProviderPaymentState {
        match status {
            "SUCCESSFUL" => ProviderPaymentState::Success,
            "PENDING" => ProviderPaymentState::Pending,
            "FAILED" => ProviderPaymentState::Failed,
            _ => ProviderPaymentState::Unknown,
        }
    }
}

#[async_trait]
impl PaymentProvider for MtnMomoProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle> {
        request.amount.validate_positive("amount")?;
        let phone = request
            .customer
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "customer.phone is required for a request-to-pay".to_string(),
                field: Some("customer.phone".to_string()),
            })?;

        let token = self.access_token().await?;
        let reference_id = Uuid::new_v4().to_string();
        let payload = serde_json::json!({
            "amount": request.amount.amount,
            "currency": request.amount.currency,
            "externalId": request.transaction_reference,
            "payer": { "partyIdType": "MSISDN", "partyId": phone },
            "payerMessage": "Trip ticket payment",
            "payeeNote": request.transaction_reference,
        });

        self.http
            .request_no_content(
                reqwest::Method::POST,
                &self.endpoint("/collection/v1_0/requesttopay"),
                Some(&token),
                Some(&payload),
                &[
                    ("X-Reference-Id", &reference_id),
                    ("X-Target-Environment", &self.config.target_environment),
                    ("Ocp-Apim-Subscription-Key", &self.config.subscription_key),
                    ("Content-Type", "application/json"),
                ],
            )
            .await?;
        info!(reference_id = %reference_id, "momo request-to-pay accepted");

        Ok(ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: request.transaction_reference,
            provider_reference: Some(reference_id.clone()),
            payment_url: None,
            pay_code: None,
            instruction: Some(format!(
                "Approve the MoMo payment prompt on {}",
                phone
            )),
            provider_data: Some(serde_json::json!({ "reference_id": reference_id })),
        })
    }

    async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse> {
        let reference_id = request
            .provider_reference
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "provider_reference (X-Reference-Id) is required".to_string(),
                field: Some("provider_reference".to_string()),
            })?;

        let token = self.access_token().await?;
        let raw: MomoRequestToPayStatus = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/collection/v1_0/requesttopay/{}", reference_id)),
                Some(&token),
                None,
                &[
                    ("X-Target-Environment", &self.config.target_environment),
                    ("Ocp-Apim-Subscription-Key", &self.config.subscription_key),
                ],
            )
            .await?;

        Ok(StatusResponse {
            status: Self::map_status(&raw.status),
            transaction_reference: Some(raw.external_id),
            provider_reference: Some(reference_id),
            amount: Some(Money {
                amount: raw.amount,
                currency: raw.currency,
            }),
            timestamp: None,
            failure_reason: raw.reason,
            provider_data: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::MtnMomo
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["UGX", "GHS", "XAF", "XOF", "EUR"]
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = signature
            .map(|token| secure_eq(token.trim().as_bytes(), self.config.callback_secret.as_bytes()))
            .unwrap_or(false);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("callback token missing or mismatched".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookPayloadError {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let external_id = parsed
            .get("externalId")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let reference_id = parsed
            .get("referenceId")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = parsed
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_status);

        Ok(WebhookEvent {
            provider: ProviderName::MtnMomo,
            event_type: "requesttopay".to_string(),
            transaction_reference: external_id,
            provider_reference: reference_id,
            status,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MomoTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MomoRequestToPayStatus {
    amount: String,
    currency: String,
    #[serde(rename = "externalId")]
    external_id: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> MtnMomoProvider {
        MtnMomoProvider::new(MtnMomoConfig {
            api_user: "user".to_string(),
            api_key: "key".to_string(),
            subscription_key: "sub".to_string(),
            callback_secret: "momo-token".to_string(),
            target_environment: "sandbox".to_string(),
            base_url: "https://sandbox.momodeveloper.mtn.com".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn callback_event_resolves_by_external_id() {
        let provider = provider();
        let payload = br#"{
            "referenceId": "0c9dbdfd-1b62-4dab-9b9f-fab4a2d7f2b3",
            "externalId": "bk_42",
            "status": "SUCCESSFUL",
            "amount": "3000",
            "currency": "UGX"
        }"#;
        let event = provider
            .parse_webhook_event(payload)
            .expect("payload should parse");
        assert_eq!(event.transaction_reference.as_deref(), Some("bk_42"));
        assert_eq!(event.status, Some(ProviderPaymentState::Success));
    }

    #[test]
    fn status_mapping_covers_momo_states() {
        assert_eq!(
            MtnMomoProvider::map_status("SUCCESSFUL"),
            ProviderPaymentState::Success
        );
        assert_eq!(
            MtnMomoProvider::map_status("PENDING"),
            ProviderPaymentState::Pending
        );
        assert_eq!(
            MtnMomoProvider::map_status("FAILED"),
            ProviderPaymentState::Failed
        );
        assert_eq!(
            MtnMomoProvider::map_status("weird"),
            ProviderPaymentState::Unknown
        );
    }

    #[test]
    fn callback_token_is_required() {
        let provider = provider();
        assert!(!provider.verify_webhook(b"{}", None).expect("no error").valid);
        assert!(provider
            .verify_webhook(b"{}", Some("momo-token"))
            .expect("no error")
            .valid);
    }
}
