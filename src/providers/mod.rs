pub mod card;
pub mod momo;
pub mod registry;
pub mod sms;
pub mod token;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::GatewayContext;
use crate::domain::{
    MessageLogEntry, Transaction, TransactionFilter, TransactionPatch, TransactionStatus,
};
use crate::envelope::ApiResponse;
use crate::error::GatewayError;
use crate::validation::{detail_string, Details};

pub use registry::ProviderRegistry;

/// Header carrying the provider code on inbound requests.
pub const PROVIDER_HEADER: &str = "x-provider";

/// Normalized inbound request handed to adapters.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub gateway_ref: Uuid,
    pub details: Details,
}

impl GatewayRequest {
    pub fn new(gateway_ref: Uuid, details: Details) -> Self {
        Self {
            gateway_ref,
            details,
        }
    }

    pub fn py_ref(&self) -> Option<String> {
        detail_string(&self.details, "pyRef")
    }

    /// Correlation ids echoed back on validation failures.
    pub fn correlation(&self) -> Value {
        json!({
            "gateway_ref": self.gateway_ref,
            "py_ref": self.py_ref(),
        })
    }
}

/// Provider answer to a status query, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamStatus {
    pub http_code: u16,
    pub status: String,
    pub financial_id: Option<String>,
    pub reason: Option<String>,
    pub payload: Value,
}

/// A provider push, reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub provider_ref: String,
    pub successful: bool,
    pub financial_id: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ValidateAccount,
    Collect,
    Transfer,
    CheckBalance,
    CheckTransactionStatus,
    HandleWebhook,
    SendSms,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ValidateAccount => "validateAccount",
            Capability::Collect => "collect",
            Capability::Transfer => "transfer",
            Capability::CheckBalance => "checkBalance",
            Capability::CheckTransactionStatus => "checkTransactionStatus",
            Capability::HandleWebhook => "handleWebhook",
            Capability::SendSms => "sendSms",
        }
    }
}

#[async_trait]
pub trait AccountValidation: Send + Sync {
    async fn validate_account(&self, request: &GatewayRequest) -> ApiResponse;
}

#[async_trait]
pub trait Collection: Send + Sync {
    async fn collect(&self, request: &GatewayRequest) -> ApiResponse;
}

#[async_trait]
pub trait Payout: Send + Sync {
    async fn transfer(&self, request: &GatewayRequest) -> ApiResponse;
}

#[async_trait]
pub trait BalanceInquiry: Send + Sync {
    async fn check_balance(&self, request: &GatewayRequest) -> ApiResponse;
}

/// Upstream half of `checkTransactionStatus`; the state machine lives in
/// the reconciliation engine.
#[async_trait]
pub trait StatusQuery: Send + Sync {
    async fn query_status(&self, tx: &Transaction) -> Result<UpstreamStatus, GatewayError>;
}

/// Upstream half of `handleWebhook`.
pub trait WebhookSource: Send + Sync {
    /// Checks the push against the configured webhook secret. Providers without
    /// a secret accept every push.
    fn authenticate(&self, headers: &HeaderMap, body: &[u8]) -> bool;

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookEvent, GatewayError>;
}

#[async_trait]
pub trait SmsDelivery: Send + Sync {
    async fn send_sms(&self, request: &GatewayRequest) -> ApiResponse;
}

/// A concrete payment network. Every capability accessor defaults to absent.
pub trait ProviderAdapter: Send + Sync {
    fn code(&self) -> &str;

    fn account_validation(&self) -> Option<&dyn AccountValidation> {
        None
    }

    fn collection(&self) -> Option<&dyn Collection> {
        None
    }

    fn payout(&self) -> Option<&dyn Payout> {
        None
    }

    fn balance_inquiry(&self) -> Option<&dyn BalanceInquiry> {
        None
    }

    fn status_query(&self) -> Option<&dyn StatusQuery> {
        None
    }

    fn webhook_source(&self) -> Option<&dyn WebhookSource> {
        None
    }

    fn sms_delivery(&self) -> Option<&dyn SmsDelivery> {
        None
    }
}

impl dyn ProviderAdapter {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::ValidateAccount => self.account_validation().is_some(),
            Capability::Collect => self.collection().is_some(),
            Capability::Transfer => self.payout().is_some(),
            Capability::CheckBalance => self.balance_inquiry().is_some(),
            Capability::CheckTransactionStatus => self.status_query().is_some(),
            Capability::HandleWebhook => self.webhook_source().is_some(),
            Capability::SendSms => self.sms_delivery().is_some(),
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        [
            Capability::ValidateAccount,
            Capability::Collect,
            Capability::Transfer,
            Capability::CheckBalance,
            Capability::CheckTransactionStatus,
            Capability::HandleWebhook,
            Capability::SendSms,
        ]
        .into_iter()
        .filter(|capability| self.supports(*capability))
        .collect()
    }

    pub fn unsupported(&self, capability: Capability) -> GatewayError {
        GatewayError::Unsupported {
            provider: self.code().to_string(),
            capability: capability.as_str(),
        }
    }

    pub async fn validate_account(&self, request: &GatewayRequest) -> ApiResponse {
        match self.account_validation() {
            Some(capability) => capability.validate_account(request).await,
            None => self.unsupported(Capability::ValidateAccount).into(),
        }
    }

    pub async fn collect(&self, request: &GatewayRequest) -> ApiResponse {
        match self.collection() {
            Some(capability) => capability.collect(request).await,
            None => self.unsupported(Capability::Collect).into(),
        }
    }

    pub async fn transfer(&self, request: &GatewayRequest) -> ApiResponse {
        match self.payout() {
            Some(capability) => capability.transfer(request).await,
            None => self.unsupported(Capability::Transfer).into(),
        }
    }

    pub async fn check_balance(&self, request: &GatewayRequest) -> ApiResponse {
        match self.balance_inquiry() {
            Some(capability) => capability.check_balance(request).await,
            None => self.unsupported(Capability::CheckBalance).into(),
        }
    }

    pub async fn send_sms(&self, request: &GatewayRequest) -> ApiResponse {
        match self.sms_delivery() {
            Some(capability) => capability.send_sms(request).await,
            None => self.unsupported(Capability::SendSms).into(),
        }
    }
}

/// Converts a failed operation into its envelope, logging it and writing it to
/// the message log first.
pub(crate) async fn reject(
    ctx: &GatewayContext,
    provider: &str,
    operation: &str,
    gateway_ref: Uuid,
    error: GatewayError,
    data: Value,
) -> ApiResponse {
    let response = ApiResponse::from(error).with_data(data);
    tracing::warn!(
        gateway_ref = %gateway_ref,
        provider = %provider,
        operation = %operation,
        code = response.code,
        "{}",
        response.message
    );
    ctx.audit(
        MessageLogEntry::new(operation, response.code, response.message.clone())
            .gateway_ref(gateway_ref)
            .provider(provider)
            .context(response.data.clone().unwrap_or(Value::Null)),
    )
    .await;
    response
}

/// Records the outcome of the initiating call on behalf of the request path.
///
/// The update is guarded on PENDING so a webhook that already settled the
/// record wins; the record as actually stored is returned either way.
pub(crate) async fn record_request_outcome(
    ctx: &GatewayContext,
    tx: &Transaction,
    patch: TransactionPatch,
) -> Result<Transaction, GatewayError> {
    let guarded =
        TransactionFilter::gateway_ref(tx.gateway_ref).with_status(TransactionStatus::Pending);
    if ctx.transactions.update_one(&guarded, &patch).await? {
        let mut applied = tx.clone();
        applied.apply(&patch);
        return Ok(applied);
    }

    let current = ctx
        .transactions
        .find_one(&TransactionFilter::gateway_ref(tx.gateway_ref))
        .await?
        .ok_or_else(|| {
            GatewayError::NotFound(format!("Transaction {} not found", tx.gateway_ref))
        })?;
    tracing::info!(
        gateway_ref = %tx.gateway_ref,
        status = %current.status,
        "Transaction settled by another path before the request completed"
    );
    Ok(current)
}

/// Envelope for a request-path outcome, derived from the stored status rather
/// than from the upstream HTTP answer.
pub(crate) async fn stored_outcome(
    ctx: &GatewayContext,
    provider: &str,
    operation: &str,
    stored: &Transaction,
) -> ApiResponse {
    let settled = format!("Transaction {}", stored.status.as_str().to_lowercase());
    match stored.status {
        TransactionStatus::Failed | TransactionStatus::Cancelled => {
            let reason = stored.message.clone().unwrap_or(settled);
            let error = GatewayError::UpstreamRejected(reason);
            reject(ctx, provider, operation, stored.gateway_ref, error, stored.summary()).await
        }
        _ => ApiResponse::ok(settled, stored.summary()),
    }
}

/// Reads a JSON scalar as text; upstream ids arrive as either strings or numbers.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reason phrase for an upstream status, used verbatim as the failure message.
pub(crate) fn status_text(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

/// Joins a configured base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
