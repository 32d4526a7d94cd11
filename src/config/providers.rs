use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::TransactionType;

/// Credentials for one mobile-money product (collection or disbursement).
/// Each product has its own subscription key and API user.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProductCredentials {
    pub subscription_key: String,
    pub api_user: String,
    pub api_key: String,
}

/// Static per-provider settings, loaded once at boot.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    /// Token endpoint host; defaults to `base_url`.
    #[serde(default)]
    pub auth_base_url: Option<String>,
    #[serde(default)]
    pub target_environment: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub collection: Option<ProductCredentials>,
    #[serde(default)]
    pub disbursement: Option<ProductCredentials>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub expects_callback: bool,
    #[serde(default)]
    pub currency: Option<String>,
}

impl ProviderConfig {
    pub fn auth_base_url(&self) -> &str {
        self.auth_base_url.as_deref().unwrap_or(&self.base_url)
    }

    /// Payouts use the disbursement product; everything else goes through collection.
    pub fn credentials_for(&self, kind: TransactionType) -> Option<&ProductCredentials> {
        match kind {
            TransactionType::Payout => self.disbursement.as_ref(),
            _ => self.collection.as_ref(),
        }
    }
}

/// Provider code -> configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProvidersConfig {
    pub providers: HashMap<String, ProviderConfig>,
}

impl ProvidersConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read provider configuration {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid provider configuration {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn get(&self, code: &str) -> Option<&ProviderConfig> {
        self.providers.get(code)
    }
}
