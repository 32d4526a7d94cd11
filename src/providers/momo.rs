use async_trait::async_trait;
use axum::http::HeaderMap;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use reqwest::{header::AUTHORIZATION, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::token::{product_path, AccessToken, TokenManager, SUBSCRIPTION_KEY_HEADER};
use super::{
    endpoint, record_request_outcome, reject, scalar_text, status_text, stored_outcome,
    AccountValidation, BalanceInquiry, Collection, GatewayRequest, Payout, ProviderAdapter,
    StatusQuery, UpstreamStatus, WebhookEvent, WebhookSource,
};
use crate::config::{ProductCredentials, ProviderConfig};
use crate::context::GatewayContext;
use crate::domain::{CompletedBy, Transaction, TransactionPatch, TransactionStatus, TransactionType};
use crate::envelope::ApiResponse;
use crate::error::GatewayError;
use crate::validation::{
    detail_string, parse_amount, require_detail, validate_currency, ValidationError,
    COUNTERPARTY_MAX_LEN, DESCRIPTION_MAX_LEN, PY_REF_MAX_LEN,
};

pub const CODE: &str = "mtn-momo";

pub const REFERENCE_HEADER: &str = "X-Reference-Id";
pub const TARGET_ENVIRONMENT_HEADER: &str = "X-Target-Environment";
pub const CALLBACK_URL_HEADER: &str = "X-Callback-Url";
pub const SIGNATURE_HEADER: &str = "x-callback-signature";

const SUCCESSFUL: &str = "SUCCESSFUL";
const DEFAULT_TARGET_ENVIRONMENT: &str = "sandbox";
const DEFAULT_DESCRIPTION: &str = "Payment";

type HmacSha256 = Hmac<Sha256>;

pub fn build(
    code: &str,
    config: ProviderConfig,
    ctx: Arc<GatewayContext>,
) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
    if config.collection.is_none() && config.disbursement.is_none() {
        anyhow::bail!(
            "provider {} needs collection and/or disbursement credentials",
            code
        );
    }
    Ok(Arc::new(MomoAdapter::new(code, config, ctx)))
}

pub struct MomoAdapter {
    code: String,
    config: ProviderConfig,
    ctx: Arc<GatewayContext>,
    tokens: TokenManager,
}

/// Fields required to initiate a collection or transfer.
#[derive(Debug, Clone)]
struct InitiateDetails {
    py_ref: String,
    msisdn: String,
    amount: BigDecimal,
    currency: String,
    description: String,
}

impl InitiateDetails {
    fn from_request(request: &GatewayRequest) -> Result<Self, ValidationError> {
        let details = &request.details;
        let msisdn = require_detail(details, "msisdn", COUNTERPARTY_MAX_LEN)?;
        let amount = parse_amount(&require_detail(details, "amount", usize::MAX)?)?;
        let currency = require_detail(details, "currency", 3)?;
        validate_currency(&currency)?;
        let py_ref = require_detail(details, "pyRef", PY_REF_MAX_LEN)?;
        let description = detail_string(details, "description")
            .or_else(|| detail_string(details, "narration"))
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())
            .chars()
            .take(DESCRIPTION_MAX_LEN)
            .collect();

        Ok(Self {
            py_ref,
            msisdn,
            amount,
            currency,
            description,
        })
    }
}

impl MomoAdapter {
    pub fn new(code: &str, config: ProviderConfig, ctx: Arc<GatewayContext>) -> Self {
        let tokens = TokenManager::new(ctx.http.clone());
        Self {
            code: code.to_string(),
            config,
            ctx,
            tokens,
        }
    }

    fn target_environment(&self) -> &str {
        self.config
            .target_environment
            .as_deref()
            .unwrap_or(DEFAULT_TARGET_ENVIRONMENT)
    }

    fn credentials(&self, kind: TransactionType) -> Result<&ProductCredentials, GatewayError> {
        self.config.credentials_for(kind).ok_or_else(|| {
            GatewayError::Configuration(format!(
                "{} has no {} credentials",
                self.code,
                product_path(kind)
            ))
        })
    }

    /// Adds the headers every product endpoint expects.
    fn authorize(
        &self,
        builder: RequestBuilder,
        token: &AccessToken,
        credentials: &ProductCredentials,
    ) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, token.bearer())
            .header(TARGET_ENVIRONMENT_HEADER, self.target_environment())
            .header(SUBSCRIPTION_KEY_HEADER, &credentials.subscription_key)
    }

    async fn reject(
        &self,
        operation: &str,
        gateway_ref: Uuid,
        error: GatewayError,
        data: Value,
    ) -> ApiResponse {
        reject(&self.ctx, &self.code, operation, gateway_ref, error, data).await
    }

    /// Shared collect/transfer flow: validate, token, persist PENDING, initiate.
    async fn initiate(&self, request: &GatewayRequest, kind: TransactionType) -> ApiResponse {
        let operation = match kind {
            TransactionType::Payout => "transfer",
            _ => "collect",
        };
        let gateway_ref = request.gateway_ref;

        let details = match InitiateDetails::from_request(request) {
            Ok(details) => details,
            Err(e) => {
                return self
                    .reject(operation, gateway_ref, e.into(), request.correlation())
                    .await
            }
        };
        let credentials = match self.credentials(kind) {
            Ok(credentials) => credentials,
            Err(e) => return self.reject(operation, gateway_ref, e, request.correlation()).await,
        };
        let token = match self.tokens.acquire(&self.code, &self.config, kind).await {
            Ok(token) => token,
            Err(e) => return self.reject(operation, gateway_ref, e, request.correlation()).await,
        };

        let provider_ref = Uuid::new_v4().to_string();
        let tx = Transaction::new(
            gateway_ref,
            details.py_ref.clone(),
            self.code.clone(),
            kind,
            details.amount.clone(),
            details.currency.clone(),
            Some(details.msisdn.clone()),
            Some(provider_ref.clone()),
        );
        if let Err(e) = self.ctx.transactions.insert_one(&tx).await {
            let error = GatewayError::from_insert(e, &details.py_ref);
            return self
                .reject(operation, gateway_ref, error, request.correlation())
                .await;
        }

        let (path, party_field) = match kind {
            TransactionType::Payout => ("disbursement/v1_0/transfer", "payee"),
            _ => ("collection/v1_0/requesttopay", "payer"),
        };
        let body = json!({
            "amount": details.amount.to_string(),
            "currency": details.currency,
            "externalId": provider_ref,
            party_field: {
                "partyIdType": "MSISDN",
                "partyId": details.msisdn,
            },
            "payerMessage": details.description,
            "payeeNote": details.description,
        });

        let mut call = self
            .authorize(
                self.ctx.http.post(endpoint(&self.config.base_url, path)),
                &token,
                credentials,
            )
            .header(REFERENCE_HEADER, &provider_ref)
            .json(&body);
        if self.config.expects_callback {
            if let Some(callback_url) = &self.config.callback_url {
                call = call.header(CALLBACK_URL_HEADER, callback_url);
            }
        }

        info!(
            gateway_ref = %gateway_ref,
            provider = %self.code,
            py_ref = %details.py_ref,
            kind = %kind,
            "Initiating mobile-money transaction"
        );

        let response = match call.send().await {
            Ok(response) => response,
            Err(e) => {
                // The record stays PENDING; a later poll or webhook settles it.
                error!(gateway_ref = %gateway_ref, provider = %self.code, "Initiate call failed: {}", e);
                let error = GatewayError::UpstreamUnreachable(format!(
                    "Unable to reach {}: {}",
                    self.config.name, e
                ));
                return self
                    .reject(operation, gateway_ref, error, tx.summary())
                    .await;
            }
        };

        let status = response.status();
        let accepted = status == StatusCode::OK || status == StatusCode::ACCEPTED;
        let patch = if accepted {
            TransactionPatch::terminal(TransactionStatus::Completed, CompletedBy::Request)
        } else {
            TransactionPatch::terminal(TransactionStatus::Failed, CompletedBy::Request)
                .message(status_text(status))
        }
        .metadata(json!({ "initiate_http_status": status.as_u16() }));

        let stored = match record_request_outcome(&self.ctx, &tx, patch).await {
            Ok(stored) => stored,
            Err(e) => return self.reject(operation, gateway_ref, e, tx.summary()).await,
        };
        info!(
            gateway_ref = %gateway_ref,
            provider = %self.code,
            http_status = status.as_u16(),
            status = %stored.status,
            "Initiate answered"
        );
        stored_outcome(&self.ctx, &self.code, operation, &stored).await
    }

    async fn lookup_account_holder(
        &self,
        request: &GatewayRequest,
    ) -> Result<ApiResponse, GatewayError> {
        let msisdn = require_detail(&request.details, "msisdn", COUNTERPARTY_MAX_LEN)?;
        let kind = TransactionType::Validation;
        let credentials = self.credentials(kind)?;
        let token = self.tokens.acquire(&self.code, &self.config, kind).await?;

        let url = endpoint(
            &self.config.base_url,
            &format!("collection/v1_0/accountholder/msisdn/{}/basicuserinfo", msisdn),
        );
        let response = self
            .authorize(self.ctx.http.get(url), &token, credentials)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(format!("Account lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamRejected(format!(
                "No registered account found for {}",
                msisdn
            )));
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let name = scalar_text(&payload["name"]).or_else(|| {
            let parts: Vec<String> = ["given_name", "family_name"]
                .iter()
                .filter_map(|field| scalar_text(&payload[*field]))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });

        match name {
            Some(name) => Ok(ApiResponse::ok(
                "Account validated",
                json!({
                    "gateway_ref": request.gateway_ref,
                    "msisdn": msisdn,
                    "name": name,
                }),
            )),
            None => Err(GatewayError::UpstreamRejected(format!(
                "No registered account found for {}",
                msisdn
            ))),
        }
    }

    async fn fetch_balance(&self, request: &GatewayRequest) -> Result<ApiResponse, GatewayError> {
        let kind = match detail_string(&request.details, "type") {
            Some(raw) => raw
                .parse::<TransactionType>()
                .map_err(|e| ValidationError::new("type", e))?,
            None => TransactionType::Collection,
        };
        let currency =
            detail_string(&request.details, "currency").or_else(|| self.config.currency.clone());
        if let Some(currency) = &currency {
            validate_currency(currency)?;
        }
        let credentials = self.credentials(kind)?;
        let token = self.tokens.acquire(&self.code, &self.config, kind).await?;

        let path = match &currency {
            Some(currency) => format!("{}/v1_0/account/balance/{}", product_path(kind), currency),
            None => format!("{}/v1_0/account/balance", product_path(kind)),
        };
        let url = endpoint(&self.config.base_url, &path);
        let response = self
            .authorize(self.ctx.http.get(url), &token, credentials)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(format!("Balance query failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamRejected(status_text(status)));
        }

        let payload: Value = response.json().await.map_err(|e| {
            GatewayError::UpstreamUnreachable(format!("malformed balance response: {}", e))
        })?;
        Ok(ApiResponse::ok(
            "Balance retrieved",
            json!({
                "gateway_ref": request.gateway_ref,
                "product": product_path(kind),
                "available_balance": payload["availableBalance"],
                "currency": payload.get("currency").cloned().unwrap_or_else(|| json!(currency)),
            }),
        ))
    }
}

impl ProviderAdapter for MomoAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn account_validation(&self) -> Option<&dyn AccountValidation> {
        self.config.collection.as_ref().map(|_| self as &dyn AccountValidation)
    }

    fn collection(&self) -> Option<&dyn Collection> {
        self.config.collection.as_ref().map(|_| self as &dyn Collection)
    }

    fn payout(&self) -> Option<&dyn Payout> {
        self.config.disbursement.as_ref().map(|_| self as &dyn Payout)
    }

    fn balance_inquiry(&self) -> Option<&dyn BalanceInquiry> {
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
impl Collection for MomoAdapter {
    async fn collect(&self, request: &GatewayRequest) -> ApiResponse {
        self.initiate(request, TransactionType::Collection).await
    }
}

#[async_trait]
impl Payout for MomoAdapter {
    async fn transfer(&self, request: &GatewayRequest) -> ApiResponse {
        self.initiate(request, TransactionType::Payout).await
    }
}

#[async_trait]
impl AccountValidation for MomoAdapter {
    async fn validate_account(&self, request: &GatewayRequest) -> ApiResponse {
        match self.lookup_account_holder(request).await {
            Ok(response) => response,
            Err(e) => {
                self.reject("validateAccount", request.gateway_ref, e, request.correlation())
                    .await
            }
        }
    }
}

#[async_trait]
impl BalanceInquiry for MomoAdapter {
    async fn check_balance(&self, request: &GatewayRequest) -> ApiResponse {
        match self.fetch_balance(request).await {
            Ok(response) => response,
            Err(e) => {
                let data = json!({ "gateway_ref": request.gateway_ref });
                self.reject("checkBalance", request.gateway_ref, e, data).await
            }
        }
    }
}

#[async_trait]
impl StatusQuery for MomoAdapter {
    async fn query_status(&self, tx: &Transaction) -> Result<UpstreamStatus, GatewayError> {
        let provider_ref = tx.provider_ref.as_deref().ok_or_else(|| {
            GatewayError::NotFound(format!(
                "Transaction {} has no upstream reference",
                tx.py_ref
            ))
        })?;
        let kind = tx.transaction_type;
        let credentials = self.credentials(kind)?;
        let token = self.tokens.acquire(&self.code, &self.config, kind).await?;

        let path = match kind {
            TransactionType::Payout => format!("disbursement/v1_0/transfer/{}", provider_ref),
            _ => format!("collection/v1_0/requesttopay/{}", provider_ref),
        };
        let response = self
            .authorize(
                self.ctx.http.get(endpoint(&self.config.base_url, &path)),
                &token,
                credentials,
            )
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

        Ok(UpstreamStatus {
            http_code: status.as_u16(),
            status: scalar_text(&payload["status"]).unwrap_or_default(),
            financial_id: scalar_text(&payload["financialTransactionId"]),
            reason: reason_text(&payload["reason"]),
            payload,
        })
    }
}

impl WebhookSource for MomoAdapter {
    fn authenticate(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(secret) = &self.config.webhook_secret else {
            return true;
        };
        headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|signature| verify_signature(secret, body, signature))
            .unwrap_or(false)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|_| ValidationError::new("body", "must be a JSON object"))?;
        let provider_ref = scalar_text(&payload["externalId"])
            .or_else(|| scalar_text(&payload["referenceId"]))
            .ok_or_else(|| ValidationError::new("externalId", "is required"))?;

        Ok(WebhookEvent {
            provider_ref,
            successful: payload["status"].as_str() == Some(SUCCESSFUL),
            financial_id: scalar_text(&payload["financialTransactionId"]),
            payload,
        })
    }
}

/// Upstream reasons arrive either as a plain string or as `{code, message}`.
fn reason_text(value: &Value) -> Option<String> {
    scalar_text(value).or_else(|| scalar_text(&value["message"]))
}

/// Hex HMAC-SHA256 of the raw body, keyed with the provider's webhook secret.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
