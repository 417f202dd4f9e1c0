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

/// Mobile-money provider (Daraja STK push). Initiation fires a push prompt
/// on the passenger's phone; the `CheckoutRequestID` is the provider
/// reference the callback is correlated by. Daraja callbacks carry no
/// signature, so authentication uses a deployment-specific callback token.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub callback_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl MpesaConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let consumer_key = std::env::var("MPESA_CONSUMER_KEY").unwrap_or_default();
        let consumer_secret = std::env::var("MPESA_CONSUMER_SECRET").unwrap_or_default();
        let short_code = std::env::var("MPESA_SHORT_CODE").unwrap_or_default();
        let passkey = std::env::var("MPESA_PASSKEY").unwrap_or_default();
        let callback_secret = std::env::var("MPESA_CALLBACK_SECRET").unwrap_or_default();
        if consumer_key.is_empty()
            || consumer_secret.is_empty()
            || short_code.is_empty()
            || passkey.is_empty()
            || callback_secret.is_empty()
        {
            return Err(PaymentError::ValidationError {
                message: "MPESA_CONSUMER_KEY, MPESA_CONSUMER_SECRET, MPESA_SHORT_CODE, \
                          MPESA_PASSKEY and MPESA_CALLBACK_SECRET are required"
                    .to_string(),
                field: Some("mpesa".to_string()),
            });
        }
        Ok(Self {
            consumer_key,
            consumer_secret,
            short_code,
            passkey,
            callback_secret,
            base_url: std::env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| "https://api.safaricom.co.ke".to_string()),
            timeout_secs: std::env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("MPESA_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        })
    }
}

pub struct MpesaProvider {
    config: MpesaConfig,
    http: PaymentHttpClient,
}

impl MpesaProvider {
    pub fn new(config: MpesaConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MpesaConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn access_token(&self) -> PaymentResult<String> {
        let basic = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));
        let raw: MpesaTokenResponse = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("/oauth/v1/generate?grant_type=client_credentials"),
                None,
                None,
                &[("Authorization", &format!("Basic {}", basic))],
            )
            .await?;
        Ok(raw.access_token)
    }

    fn stk_password(&self, timestamp: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!(
            "{}{}{}",
            self.config.short_code, self.config.passkey, timestamp
        ))
    }

    fn normalized_msisdn(phone: &str) -> PaymentResult<String> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let msisdn = if digits.starts_with("254") {
            digits
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("254{}", rest)
        } else {
            digits
        };
        if msisdn.len() != 12 {
            return Err(PaymentError::ValidationError {
                message: format!("invalid M-Pesa phone number: {}", phone),
                field: Some("customer.phone".to_string()),
            });
        }
        Ok(msisdn)
    }

    fn result_code_state(code: i64) -> ProviderPaymentState {
        match code {
            0 => ProviderPaymentState::Success,
            1032 => ProviderPaymentState::Cancelled,
            _ => ProviderPaymentState::Failed,
        }
    }
}

#[async_trait]
impl PaymentProvider for MpesaProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle> {
        request.amount.validate_positive("amount")?;
        let phone = request
            .customer
            .phone
            .as_deref()
            .ok_or(PaymentError::ValidationError {
                message: "customer.phone is required for an STK push".to_string(),
                field: Some("customer.phone".to_string()),
            })?;
        let msisdn = Self::normalized_msisdn(phone)?;

        let token = self.access_token().await?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let payload = serde_json::json!({
            "BusinessShortCode": self.config.short_code,
            "Password": self.stk_password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": request.amount.amount,
            "PartyA": msisdn,
            "PartyB": self.config.short_code,
            "PhoneNumber": msisdn,
            "CallBackURL": request.callback_url,
            "AccountReference": request.transaction_reference,
            "TransactionDesc": "Trip ticket payment",
        });

        let raw: MpesaStkResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/mpesa/stkpush/v1/processrequest"),
                Some(&token),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if raw.response_code != "0" {
            return Err(PaymentError::ProviderError {
                provider: "mpesa".to_string(),
                message: raw.response_description,
                provider_code: Some(raw.response_code),
                retryable: false,
            });
        }
        info!(checkout_request_id = %raw.checkout_request_id, "mpesa STK push sent");

        Ok(ProviderHandle {
            status: ProviderPaymentState::Pending,
            transaction_reference: request.transaction_reference,
            provider_reference: Some(raw.checkout_request_id.clone()),
            payment_url: None,
            pay_code: None,
            instruction: Some(format!(
                "Enter your M-Pesa PIN on {} to authorize the payment",
                msisdn
            )),
            provider_data: Some(serde_json::json!({
                "checkout_request_id": raw.checkout_request_id,
                "merchant_request_id": raw.merchant_request_id,
            })),
        })
    }

    async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse> {
        let checkout_request_id = request
            .provider_reference
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "provider_reference (CheckoutRequestID) is required".to_string(),
                field: Some("provider_reference".to_string()),
            })?;

        let token = self.access_token().await?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let payload = serde_json::json!({
            "BusinessShortCode": self.config.short_code,
            "Password": self.stk_password(&timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let raw: MpesaStkQueryResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/mpesa/stkpushquery/v1/query"),
                Some(&token),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        let result_code =
            raw.result_code
                .parse::<i64>()
                .map_err(|_| PaymentError::ProviderError {
                    provider: "mpesa".to_string(),
                    message: format!("unexpected ResultCode: {}", raw.result_code),
                    provider_code: Some(raw.result_code.clone()),
                    retryable: false,
                })?;

        Ok(StatusResponse {
            status: Self::result_code_state(result_code),
            transaction_reference: request.transaction_reference,
            provider_reference: Some(checkout_request_id),
            amount: None,
            timestamp: None,
            failure_reason: if result_code == 0 {
                None
            } else {
                Some(raw.result_desc)
            },
            provider_data: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Mpesa
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["KES"]
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

        let callback = parsed.get("Body").and_then(|b| b.get("stkCallback"));
        let checkout_request_id = callback
            .and_then(|c| c.get("CheckoutRequestID"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let result_code = callback
            .and_then(|c| c.get("ResultCode"))
            .and_then(|v| v.as_i64());

        Ok(WebhookEvent {
            provider: ProviderName::Mpesa,
            event_type: "stk_callback".to_string(),
            // Daraja does not echo the AccountReference; correlation runs
            // through the stored CheckoutRequestID.
            transaction_reference: None,
            provider_reference: checkout_request_id,
            status: result_code.map(Self::result_code_state),
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MpesaTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MpesaStkResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
    #[serde(rename = "ResponseDescription")]
    response_description: String,
}

#[derive(Debug, Deserialize)]
struct MpesaStkQueryResponse {
    #[serde(rename = "ResultCode")]
    result_code: String,
    #[serde(rename = "ResultDesc")]
    result_desc: String,
}
