use crate::payments::error::PaymentResult;
use crate::payments::types::{
    PaymentRequest, ProviderHandle, ProviderName, StatusRequest, StatusResponse, WebhookEvent,
    WebhookVerificationResult,
};
use async_trait::async_trait;

/// Uniform interface over the payment providers.
///
/// Implementations own provider-specific request shaping only. They never
/// touch ledger or ticket state: `initiate_payment` returns data the booking
/// orchestrator persists, and webhook parsing/verification feeds the
/// reconciliation engine.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Start a payment attempt with the provider. The returned handle carries
    /// whatever the client needs to complete payment out-of-band.
    async fn initiate_payment(&self, request: PaymentRequest) -> PaymentResult<ProviderHandle>;

    /// Pull-based verification against the provider's API. Callers must check
    /// `supports_verification()` first; providers without a verify endpoint
    /// return a provider error.
    async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse>;

    fn name(&self) -> ProviderName;

    fn supported_currencies(&self) -> &'static [&'static str];

    /// Whether the provider exposes a pull verification endpoint. When true,
    /// the reconciliation engine must not trust a push payload on its face.
    fn supports_verification(&self) -> bool {
        true
    }

    /// Authenticate an inbound callback from its raw body and auth header
    /// value (signature or shared secret, provider-specific).
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CustomerContact, Money, PaymentMethod, ProviderPaymentState};

    struct MockProvider;

    #[async_trait]
    impl PaymentProvider for MockProvider {
        async fn initiate_payment(
            &self,
            request: PaymentRequest,
        ) -> PaymentResult<ProviderHandle> {
            Ok(ProviderHandle {
                status: ProviderPaymentState::Pending,
                transaction_reference: request.transaction_reference,
                provider_reference: Some("mock_ref".to_string()),
                payment_url: Some("https://example.com/pay".to_string()),
                pay_code: None,
                instruction: None,
                provider_data: None,
            })
        }

        async fn verify_payment(&self, request: StatusRequest) -> PaymentResult<StatusResponse> {
            Ok(StatusResponse {
                status: ProviderPaymentState::Success,
                transaction_reference: request.transaction_reference,
                provider_reference: request.provider_reference,
                amount: None,
                timestamp: None,
                failure_reason: None,
                provider_data: None,
            })
        }

        fn name(&self) -> ProviderName {
            ProviderName::Paystack
        }

        fn supported_currencies(&self) -> &'static [&'static str] {
            &["KES"]
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: Option<&str>,
        ) -> PaymentResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            Ok(WebhookEvent {
                provider: ProviderName::Paystack,
                event_type: "mock".to_string(),
                transaction_reference: None,
                provider_reference: None,
                status: Some(ProviderPaymentState::Success),
                payload: serde_json::json!({}),
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn PaymentProvider> = Box::new(MockProvider);
        let handle = provider
            .initiate_payment(PaymentRequest {
                amount: Money {
                    amount: "1200".to_string(),
                    currency: "KES".to_string(),
                },
                customer: CustomerContact {
                    phone: Some("+254712345678".to_string()),
                    email: None,
                },
                payment_method: PaymentMethod::MobileMoney,
                callback_url: None,
                transaction_reference: "bk_1".to_string(),
                metadata: None,
            })
            .await
            .expect("initiation should succeed");
        assert_eq!(handle.status, ProviderPaymentState::Pending);
        assert!(provider.supports_verification());
    }
}
