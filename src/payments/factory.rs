use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{
    BankTransferProvider, FlutterwaveProvider, MpesaProvider, MtnMomoProvider, PaystackProvider,
};
use crate::payments::types::ProviderName;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub default_provider: ProviderName,
    pub enabled_providers: Vec<ProviderName>,
}

impl PaymentFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let default_provider =
            std::env::var("DEFAULT_PAYMENT_PROVIDER").unwrap_or_else(|_| "mpesa".to_string());
        let default_provider = ProviderName::from_str(&default_provider)?;

        let enabled_raw = std::env::var("ENABLED_PAYMENT_PROVIDERS").unwrap_or_else(|_| {
            "mpesa,mtn_momo,paystack,flutterwave,bank_transfer".to_string()
        });
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            enabled_providers.push(ProviderName::from_str(value)?);
        }

        if !enabled_providers.contains(&default_provider) {
            return Err(PaymentError::ValidationError {
                message: "default provider must be enabled".to_string(),
                field: Some("DEFAULT_PAYMENT_PROVIDER".to_string()),
            });
        }

        Ok(Self {
            default_provider,
            enabled_providers,
        })
    }
}

/// Holds one long-lived instance of each enabled provider. Webhook handling
/// and booking initiation both resolve providers through here.
pub struct PaymentProviderFactory {
    config: PaymentFactoryConfig,
    providers: HashMap<ProviderName, Arc<dyn PaymentProvider>>,
}

impl PaymentProviderFactory {
    pub fn from_env() -> PaymentResult<Self> {
        let config = PaymentFactoryConfig::from_env()?;
        let mut providers: HashMap<ProviderName, Arc<dyn PaymentProvider>> = HashMap::new();
        for name in &config.enabled_providers {
            let provider: Arc<dyn PaymentProvider> = match name {
                ProviderName::Mpesa => Arc::new(MpesaProvider::from_env()?),
                ProviderName::MtnMomo => Arc::new(MtnMomoProvider::from_env()?),
                ProviderName::Paystack => Arc::new(PaystackProvider::from_env()?),
                ProviderName::Flutterwave => Arc::new(FlutterwaveProvider::from_env()?),
                ProviderName::BankTransfer => Arc::new(BankTransferProvider::from_env()?),
            };
            providers.insert(name.clone(), provider);
        }
        Ok(Self { config, providers })
    }

    /// Build a factory from pre-constructed providers; test doubles plug in
    /// through this path.
    pub fn with_providers(
        config: PaymentFactoryConfig,
        providers: Vec<Arc<dyn PaymentProvider>>,
    ) -> Self {
        Self {
            config,
            providers: providers.into_iter().map(|p| (p.name(), p)).collect(),
        }
    }

    pub fn get_provider(&self, provider: &ProviderName) -> PaymentResult<Arc<dyn PaymentProvider>> {
        if !self.config.enabled_providers.contains(provider) {
            return Err(PaymentError::ValidationError {
                message: format!("provider {} is disabled", provider),
                field: Some("provider".to_string()),
            });
        }
        self.providers
            .get(provider)
            .cloned()
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!("provider {} is not configured", provider),
                field: Some("provider".to_string()),
            })
    }

    pub fn get_default_provider(&self) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.get_provider(&self.config.default_provider)
    }

    pub fn list_available_providers(&self) -> Vec<ProviderName> {
        self.config.enabled_providers.clone()
    }
}
