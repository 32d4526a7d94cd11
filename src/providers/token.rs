use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{endpoint, status_text};
use crate::config::ProviderConfig;
use crate::domain::TransactionType;
use crate::error::GatewayError;

/// Header carrying the per-product subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl AccessToken {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Product segment of mobile-money URLs for a transaction type.
pub fn product_path(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Payout => "disbursement",
        _ => "collection",
    }
}

#[derive(Clone)]
pub struct TokenManager {
    client: reqwest::Client,
}

impl TokenManager {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Non-2xx answers are business rejections (422); transport or decoding
    /// failures are 500. Either way the caller propagates the error unchanged.
    pub async fn acquire(
        &self,
        provider: &str,
        config: &ProviderConfig,
        kind: TransactionType,
    ) -> Result<AccessToken, GatewayError> {
        let credentials = config.credentials_for(kind).ok_or_else(|| {
            GatewayError::TokenUnavailable(format!(
                "no {} credentials configured for {}",
                product_path(kind),
                provider
            ))
        })?;
        let url = endpoint(
            config.auth_base_url(),
            &format!("{}/token/", product_path(kind)),
        );

        debug!(provider = %provider, kind = %kind, "Requesting access token");

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.api_user, Some(&credentials.api_key))
            .header(SUBSCRIPTION_KEY_HEADER, &credentials.subscription_key)
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| {
                warn!(provider = %provider, kind = %kind, "Token endpoint unreachable: {}", e);
                GatewayError::TokenUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider = %provider, kind = %kind, status = status.as_u16(), "Token request rejected");
            return Err(GatewayError::TokenRejected(status_text(status)));
        }

        response
            .json::<AccessToken>()
            .await
            .map_err(|e| GatewayError::TokenUnavailable(format!("malformed token response: {}", e)))
    }
}
