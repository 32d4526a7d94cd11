//! Settles PENDING transactions from status polls and provider webhooks.

use axum::http::HeaderMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::GatewayContext;
use crate::domain::{
    CompletedBy, MessageLogEntry, Transaction, TransactionFilter, TransactionPatch,
    TransactionStatus,
};
use crate::envelope::ApiResponse;
use crate::error::GatewayError;
use crate::providers::{reject, Capability, ProviderRegistry, UpstreamStatus};

/// Literal a provider reports for a settled transaction.
pub const UPSTREAM_SUCCESS: &str = "SUCCESSFUL";

const VERIFY_FAILED: &str = "Unable to verify transaction status";

/// Decision taken for one upstream status answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Completed,
    Cancelled,
    StillPending,
    /// Unrecognised value; persisted verbatim and surfaced with the upstream code.
    PassThrough(String),
}

/// Free-text classification of an upstream status answer.
pub fn classify(upstream: &UpstreamStatus) -> StatusOutcome {
    if upstream.status == UPSTREAM_SUCCESS && upstream.financial_id.is_some() {
        return StatusOutcome::Completed;
    }
    let lowered = upstream.status.to_lowercase();
    if lowered.contains("cancelled") {
        StatusOutcome::Cancelled
    } else if lowered.contains("pending") || lowered.contains("progress") {
        StatusOutcome::StillPending
    } else {
        StatusOutcome::PassThrough(upstream.status.clone())
    }
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    ctx: Arc<GatewayContext>,
    registry: ProviderRegistry,
}

impl ReconciliationEngine {
    pub fn new(ctx: Arc<GatewayContext>, registry: ProviderRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Poll path. Terminal records are answered from the ledger without any
    /// upstream call.
    pub async fn check_transaction_status(&self, gateway_ref: Uuid, py_ref: &str) -> ApiResponse {
        let operation = Capability::CheckTransactionStatus.as_str();
        let correlation = json!({ "gateway_ref": gateway_ref, "py_ref": py_ref });

        let tx = match self.ctx.transactions.find_one(&TransactionFilter::py_ref(py_ref)).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                let error =
                    GatewayError::NotFound(format!("Transaction with reference {} not found", py_ref));
                return reject(&self.ctx, "", operation, gateway_ref, error, correlation).await;
            }
            Err(e) => return reject(&self.ctx, "", operation, gateway_ref, e.into(), correlation).await,
        };

        if tx.status.is_terminal() {
            debug!(gateway_ref = %tx.gateway_ref, status = %tx.status, "Answering status poll from ledger");
            return settled_response(&tx);
        }

        let Some(adapter) = self.registry.get(&tx.provider) else {
            let error = GatewayError::UnknownProvider(tx.provider.clone());
            return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, error, tx.summary())
                .await;
        };
        let Some(query) = adapter.status_query() else {
            let error = adapter.unsupported(Capability::CheckTransactionStatus);
            return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, error, tx.summary())
                .await;
        };

        let upstream = match query.query_status(&tx).await {
            Ok(upstream) if !upstream.status.is_empty() => upstream,
            Ok(_) => {
                let error = GatewayError::UpstreamUnreachable(VERIFY_FAILED.to_string());
                return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, error, tx.summary())
                    .await;
            }
            Err(GatewayError::UpstreamUnreachable(cause)) => {
                warn!(gateway_ref = %tx.gateway_ref, provider = %tx.provider, "Status query failed: {}", cause);
                let error = GatewayError::UpstreamUnreachable(VERIFY_FAILED.to_string());
                return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, error, tx.summary())
                    .await;
            }
            Err(e) => {
                return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, e, tx.summary())
                    .await
            }
        };

        info!(
            gateway_ref = %tx.gateway_ref,
            provider = %tx.provider,
            upstream_status = %upstream.status,
            "Upstream status received"
        );

        let metadata = json!({
            "upstream_status": upstream.status,
            "upstream": upstream.payload,
        });
        let (patch, code) = match classify(&upstream) {
            StatusOutcome::Completed => (
                TransactionPatch::terminal(TransactionStatus::Completed, CompletedBy::TransCheck)
                    .financial_id(upstream.financial_id.clone())
                    .metadata(metadata),
                200,
            ),
            StatusOutcome::Cancelled => (
                TransactionPatch::terminal(TransactionStatus::Cancelled, CompletedBy::TransCheck)
                    .message(upstream.reason.clone().unwrap_or_else(|| upstream.status.clone()))
                    .metadata(metadata),
                500,
            ),
            StatusOutcome::StillPending => {
                let error = GatewayError::StillPending(format!(
                    "Transaction {} is still in progress",
                    tx.py_ref
                ));
                return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, error, tx.summary())
                    .await;
            }
            StatusOutcome::PassThrough(raw) => {
                let mut patch =
                    TransactionPatch::terminal(TransactionStatus::from(raw), CompletedBy::TransCheck)
                        .financial_id(upstream.financial_id.clone())
                        .metadata(metadata);
                if let Some(reason) = &upstream.reason {
                    patch = patch.message(reason.clone());
                }
                (patch, upstream.http_code)
            }
        };

        self.settle(tx, patch, code, operation).await
    }

    /// Writes a poll outcome, guarded on the record still being PENDING.
    async fn settle(
        &self,
        mut tx: Transaction,
        patch: TransactionPatch,
        code: u16,
        operation: &str,
    ) -> ApiResponse {
        let guarded = TransactionFilter::gateway_ref(tx.gateway_ref)
            .with_status(TransactionStatus::Pending);
        match self.ctx.transactions.update_one(&guarded, &patch).await {
            Ok(true) => {}
            Ok(false) => return self.stored_state(&tx, operation).await,
            Err(e) => {
                return reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, e.into(), tx.summary())
                    .await
            }
        }

        tx.apply(&patch);
        info!(gateway_ref = %tx.gateway_ref, status = %tx.status, "Transaction reconciled by status check");

        let response = ApiResponse::new(code, settled_message(&tx.status), Some(tx.summary()));
        if !response.success {
            self.ctx
                .audit(
                    MessageLogEntry::new(operation, response.code, response.message.clone())
                        .gateway_ref(tx.gateway_ref)
                        .provider(&tx.provider)
                        .context(tx.summary()),
                )
                .await;
        }
        response
    }

    /// Another channel settled the record first; report what it stored.
    async fn stored_state(&self, tx: &Transaction, operation: &str) -> ApiResponse {
        match self
            .ctx
            .transactions
            .find_one(&TransactionFilter::gateway_ref(tx.gateway_ref))
            .await
        {
            Ok(Some(current)) => {
                info!(
                    gateway_ref = %current.gateway_ref,
                    status = %current.status,
                    "Transaction already settled by another path"
                );
                settled_response(&current)
            }
            Ok(None) => {
                let error = GatewayError::NotFound(format!("Transaction {} not found", tx.gateway_ref));
                reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, error, tx.summary()).await
            }
            Err(e) => {
                reject(&self.ctx, &tx.provider, operation, tx.gateway_ref, e.into(), tx.summary())
                    .await
            }
        }
    }

    /// Webhook path. Once the push is authenticated and parsed it is always
    /// acknowledged with 200, even when no matching record exists, so the
    /// provider does not retry it.
    pub async fn handle_webhook(
        &self,
        gateway_ref: Uuid,
        provider: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> ApiResponse {
        let operation = Capability::HandleWebhook.as_str();
        let no_data = json!({ "gateway_ref": gateway_ref, "provider": provider });

        let Some(adapter) = self.registry.get(provider) else {
            let error = GatewayError::UnknownProvider(provider.to_string());
            return reject(&self.ctx, provider, operation, gateway_ref, error, no_data).await;
        };
        let Some(source) = adapter.webhook_source() else {
            let error = adapter.unsupported(Capability::HandleWebhook);
            return reject(&self.ctx, provider, operation, gateway_ref, error, no_data).await;
        };

        if !source.authenticate(headers, body) {
            let error = GatewayError::Unauthorized("webhook signature mismatch".to_string());
            return reject(&self.ctx, provider, operation, gateway_ref, error, no_data).await;
        }

        let event = match source.parse_webhook(body) {
            Ok(event) => event,
            Err(e) => return reject(&self.ctx, provider, operation, gateway_ref, e, no_data).await,
        };

        let acknowledged = |data: Value| ApiResponse::ok("Webhook received", data);
        let lookup = TransactionFilter::provider_ref(event.provider_ref.clone());
        let mut tx = match self.ctx.transactions.find_one(&lookup).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                warn!(provider = %provider, provider_ref = %event.provider_ref, "Webhook for unknown transaction");
                self.ctx
                    .audit(
                        MessageLogEntry::new(operation, 200, "Webhook for unknown transaction")
                            .gateway_ref(gateway_ref)
                            .provider(provider)
                            .context(json!({
                                "provider_ref": event.provider_ref,
                                "payload": event.payload,
                            })),
                    )
                    .await;
                return acknowledged(json!({ "provider_ref": event.provider_ref }));
            }
            Err(e) => {
                // Still acknowledged; a storage fault is ours, not the provider's.
                let response =
                    reject(&self.ctx, provider, operation, gateway_ref, e.into(), no_data).await;
                return acknowledged(response.data.unwrap_or(Value::Null));
            }
        };

        if tx.status.is_terminal() {
            debug!(gateway_ref = %tx.gateway_ref, status = %tx.status, "Webhook for settled transaction ignored");
            return acknowledged(tx.summary());
        }

        let status = if event.successful {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        let patch = TransactionPatch::terminal(status, CompletedBy::Webhook)
            .financial_id(event.financial_id.clone())
            .metadata(json!({ "webhook": event.payload }));
        let guarded = TransactionFilter::gateway_ref(tx.gateway_ref)
            .with_status(TransactionStatus::Pending);

        match self.ctx.transactions.update_one(&guarded, &patch).await {
            Ok(true) => {
                tx.apply(&patch);
                info!(gateway_ref = %tx.gateway_ref, status = %tx.status, "Transaction reconciled by webhook");
                acknowledged(tx.summary())
            }
            Ok(false) => {
                debug!(gateway_ref = %tx.gateway_ref, "Webhook lost race to another settlement path");
                let current = self
                    .ctx
                    .transactions
                    .find_one(&TransactionFilter::gateway_ref(tx.gateway_ref))
                    .await;
                match current {
                    Ok(Some(current)) => acknowledged(current.summary()),
                    _ => acknowledged(tx.summary()),
                }
            }
            Err(e) => {
                let response =
                    reject(&self.ctx, provider, operation, tx.gateway_ref, e.into(), tx.summary())
                        .await;
                acknowledged(response.data.unwrap_or(Value::Null))
            }
        }
    }
}

fn settled_message(status: &TransactionStatus) -> String {
    format!("Transaction {}", status.as_str().to_lowercase())
}

fn settled_response(tx: &Transaction) -> ApiResponse {
    ApiResponse::ok(settled_message(&tx.status), tx.summary())
}
