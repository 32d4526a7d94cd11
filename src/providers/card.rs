use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    endpoint, record_request_outcome, reject, scalar_text, status_text, stored_outcome,
    Collection, GatewayRequest, ProviderAdapter, StatusQuery, UpstreamStatus, WebhookEvent,
    WebhookSource,
};
use crate::config::ProviderConfig;
use crate::context::GatewayContext;
use crate::domain::{
    CompletedBy, Transaction, TransactionFilter, TransactionPatch, TransactionStatus,
    TransactionType,
};
use crate::envelope::ApiResponse;
use crate::error::GatewayError;
use crate::validation::{
    detail_string, parse_amount, require_detail, validate_currency, ValidationError,
    COUNTERPARTY_MAX_LEN, DESCRIPTION_MAX_LEN, PY_REF_MAX_LEN,
};

pub const CODE: &str = "flutterwave";

/// Header the processor echoes the configured secret hash in.
pub const VERIFY_HASH_HEADER: &str = "verif-hash";

type HmacSha256 = Hmac<Sha256>;

const SUCCESSFUL: &str = "successful";
const EMAIL_MAX_LEN: usize = 254;

pub fn build(
    code: &str,
    config: ProviderConfig,
    ctx: Arc<GatewayContext>,
) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
    let secret_key = config
        .secret_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("provider {} needs a secret_key", code))?;
    if config.redirect_url.is_none() {
        anyhow::bail!("provider {} needs a redirect_url", code);
    }
    Ok(Arc::new(CardAdapter {
        code: code.to_string(),
        secret_key,
        config,
        ctx,
    }))
}

pub struct CardAdapter {
    code: String,
    secret_key: String,
    config: ProviderConfig,
    ctx: Arc<GatewayContext>,
}

#[derive(Debug, Clone)]
struct CheckoutDetails {
    py_ref: String,
    email: String,
    amount: BigDecimal,
    currency: String,
    phone: Option<String>,
    name: Option<String>,
    description: String,
}

impl CheckoutDetails {
    fn from_request(request: &GatewayRequest) -> Result<Self, ValidationError> {
        let details = &request.details;
        let email = require_detail(details, "email", EMAIL_MAX_LEN)?;
        if !email.contains('@') {
            return Err(ValidationError::new("email", "must be an email address"));
        }
        let amount = parse_amount(&require_detail(details, "amount", usize::MAX)?)?;
        let currency = require_detail(details, "currency", 3)?;
        validate_currency(&currency)?;
        let py_ref = require_detail(details, "pyRef", PY_REF_MAX_LEN)?;
        let phone = detail_string(details, "msisdn")
            .or_else(|| detail_string(details, "phonenumber"))
            .map(|phone| phone.chars().take(COUNTERPARTY_MAX_LEN).collect());
        let description = require_detail(details, "description", DESCRIPTION_MAX_LEN)?;

        Ok(Self {
            py_ref,
            email,
            amount,
            currency,
            phone,
            name: detail_string(details, "name"),
            description,
        })
    }
}

impl CardAdapter {
    #[cfg(test)]
    fn new(code: &str, config: ProviderConfig, ctx: Arc<GatewayContext>) -> Self {
        Self {
            code: code.to_string(),
            secret_key: config.secret_key.clone().unwrap_or_default(),
            config,
            ctx,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    async fn reject(
        &self,
        gateway_ref: Uuid,
        error: GatewayError,
        data: Value,
    ) -> ApiResponse {
        reject(&self.ctx, &self.code, "collect", gateway_ref, error, data).await
    }

    fn checkout_body(&self, details: &CheckoutDetails, provider_ref: &str) -> Value {
        json!({
            "tx_ref": provider_ref,
            "amount": details.amount.to_string(),
            "currency": details.currency,
            "redirect_url": self.config.redirect_url,
            "customer": {
                "email": details.email,
                "phonenumber": details.phone,
                "name": details.name,
            },
            "customizations": {
                "title": self.config.name,
                "description": details.description,
            },
        })
    }
}

impl ProviderAdapter for CardAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn collection(&self) -> Option<&dyn Collection> {
        Some(self)
    }

    fn status_query(&self) -> Option<&dyn StatusQuery> {
        Some(self)
    }

    fn webhook_source(&self) -> Option<&dyn WebhookSource> {
        Some(self)
    }
}

#[async_trait]
impl Collection for CardAdapter {
    async fn collect(&self, request: &GatewayRequest) -> ApiResponse {
        let gateway_ref = request.gateway_ref;
        let details = match CheckoutDetails::from_request(request) {
            Ok(details) => details,
            Err(e) => return self.reject(gateway_ref, e.into(), request.correlation()).await,
        };

        let provider_ref = Uuid::new_v4().to_string();
        let tx = Transaction::new(
            gateway_ref,
            details.py_ref.clone(),
            self.code.clone(),
            TransactionType::Purchase,
            details.amount.clone(),
            details.currency.clone(),
            Some(details.email.clone()),
            Some(provider_ref.clone()),
        );
        if let Err(e) = self.ctx.transactions.insert_one(&tx).await {
            let error = GatewayError::from_insert(e, &details.py_ref);
            return self.reject(gateway_ref, error, request.correlation()).await;
        }

        info!(gateway_ref = %gateway_ref, provider = %self.code, py_ref = %details.py_ref, "Creating hosted checkout");

        let response = match self
            .ctx
            .http
            .post(endpoint(&self.config.base_url, "v3/payments"))
            .header(AUTHORIZATION, self.bearer())
            .json(&self.checkout_body(&details, &provider_ref))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(gateway_ref = %gateway_ref, provider = %self.code, "Checkout call failed: {}", e);
                let error = GatewayError::UpstreamUnreachable(format!(
                    "Unable to reach {}: {}",
                    self.config.name, e
                ));
                return self.reject(gateway_ref, error, tx.summary()).await;
            }
        };

        let status = response.status();
        let data = json!({
            "gateway_ref": gateway_ref,
            "py_ref": details.py_ref,
        });

        if !status.is_success() {
            let patch = TransactionPatch::terminal(TransactionStatus::Failed, CompletedBy::Request)
                .message(status_text(status))
                .metadata(json!({ "initiate_http_status": status.as_u16() }));
            return match record_request_outcome(&self.ctx, &tx, patch).await {
                Ok(stored) => stored_outcome(&self.ctx, &self.code, "collect", &stored).await,
                Err(e) => self.reject(gateway_ref, e, data).await,
            };
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let Some(link) = scalar_text(&payload["data"]["link"]) else {
            let error = GatewayError::UpstreamRejected(
                scalar_text(&payload["message"])
                    .unwrap_or_else(|| "Checkout link missing from response".to_string()),
            );
            return self.reject(gateway_ref, error, tx.summary()).await;
        };

        // Stays PENDING: the link only opens the checkout.
        let patch = TransactionPatch::default().metadata(json!({ "checkout_link": link }));
        if let Err(e) = self
            .ctx
            .transactions
            .update_one(&TransactionFilter::gateway_ref(gateway_ref), &patch)
            .await
        {
            return self.reject(gateway_ref, e.into(), data).await;
        }

        ApiResponse::ok(
            "Checkout created",
            json!({
                "status": tx.status.as_str(),
                "gateway_ref": gateway_ref,
                "py_ref": details.py_ref,
                "link": link,
            }),
        )
    }
}

#[async_trait]
impl StatusQuery for CardAdapter {
    async fn query_status(&self, tx: &Transaction) -> Result<UpstreamStatus, GatewayError> {
        let provider_ref = tx.provider_ref.as_deref().ok_or_else(|| {
            GatewayError::NotFound(format!(
                "Transaction {} has no upstream reference",
                tx.py_ref
            ))
        })?;
        let response = self
            .ctx
            .http
            .get(endpoint(&self.config.base_url, "v3/transactions/verify_by_reference"))
            .query(&[("tx_ref", provider_ref)])
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamRejected(status_text(status)));
        }
        let payload: Value = response.json().await.map_err(|e| {
            GatewayError::UpstreamUnreachable(format!("malformed status response: {}", e))
        })?;

        let raw = scalar_text(&payload["data"]["status"]).unwrap_or_default();
        let normalized = if raw.eq_ignore_ascii_case(SUCCESSFUL) {
            "SUCCESSFUL".to_string()
        } else {
            raw
        };

        Ok(UpstreamStatus {
            http_code: status.as_u16(),
            status: normalized,
            financial_id: scalar_text(&payload["data"]["id"]),
            reason: scalar_text(&payload["data"]["processor_response"]),
            payload,
        })
    }
}

impl WebhookSource for CardAdapter {
    fn authenticate(&self, headers: &HeaderMap, _body: &[u8]) -> bool {
        let Some(secret) = &self.config.webhook_secret else {
            return true;
        };
        headers
            .get(VERIFY_HASH_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|hash| hash_matches(secret, hash))
            .unwrap_or(false)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|_| ValidationError::new("body", "must be a JSON object"))?;
        let provider_ref = scalar_text(&payload["data"]["tx_ref"])
            .or_else(|| scalar_text(&payload["txRef"]))
            .ok_or_else(|| ValidationError::new("tx_ref", "is required"))?;
        let status = scalar_text(&payload["data"]["status"])
            .or_else(|| scalar_text(&payload["status"]))
            .unwrap_or_default();

        Ok(WebhookEvent {
            provider_ref,
            successful: status == SUCCESSFUL,
            financial_id: scalar_text(&payload["data"]["id"]).or_else(|| scalar_text(&payload["id"])),
            payload,
        })
    }
}

/// Constant-time equality of the pushed hash and the configured secret,
/// compared through their MACs under the secret.
fn hash_matches(secret: &str, presented: &str) -> bool {
    let Ok(mut expected) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    expected.update(secret.as_bytes());
    let expected = expected.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(presented.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
