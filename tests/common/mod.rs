#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use paygate_core::adapters::{InMemoryMessageLog, InMemoryTransactionRepository};
use paygate_core::config::ProvidersConfig;
use paygate_core::context::GatewayContext;
use paygate_core::domain::{Transaction, TransactionFilter, TransactionPatch, TransactionStatus};
use paygate_core::middleware::RequestLogging;
use paygate_core::ports::{RepositoryResult, TransactionRepository};
use paygate_core::providers::ProviderRegistry;
use paygate_core::{create_app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const TOKEN_BODY: &str =
    r#"{"access_token":"tok-1","token_type":"access_token","expires_in":3600}"#;

pub struct TestGateway {
    pub app: Router,
    pub state: AppState,
    pub transactions: InMemoryTransactionRepository,
    pub messages: InMemoryMessageLog,
}

impl TestGateway {
    pub fn new(providers: Value) -> Self {
        let transactions = InMemoryTransactionRepository::new();
        Self::build(providers, transactions.clone(), Arc::new(transactions))
    }

    /// Gateway whose ledger lets another settlement path land `winner` just
    /// before every PENDING-guarded update.
    pub fn settled_first(providers: Value, winner: TransactionPatch) -> Self {
        let transactions = InMemoryTransactionRepository::new();
        let ledger = SettledFirst {
            inner: transactions.clone(),
            winner,
        };
        Self::build(providers, transactions, Arc::new(ledger))
    }

    fn build(
        providers: Value,
        transactions: InMemoryTransactionRepository,
        ledger: Arc<dyn TransactionRepository>,
    ) -> Self {
        let providers: ProvidersConfig = serde_json::from_value(providers).unwrap();
        let messages = InMemoryMessageLog::new();
        let context = Arc::new(GatewayContext::new(
            ledger,
            Arc::new(messages.clone()),
            reqwest::Client::new(),
        ));
        let registry = ProviderRegistry::from_config(&providers, context.clone()).unwrap();
        let state = AppState::new(
            context,
            registry,
            Duration::from_secs(10),
            RequestLogging { log_body: true },
        );

        Self {
            app: create_app(state.clone()),
            state,
            transactions,
            messages,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn post(&self, uri: &str, provider: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(provider) = provider {
            builder = builder.header("x-provider", provider);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

pub struct SettledFirst {
    inner: InMemoryTransactionRepository,
    winner: TransactionPatch,
}

#[async_trait]
impl TransactionRepository for SettledFirst {
    async fn insert_one(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        self.inner.insert_one(tx).await
    }

    async fn find_one(&self, filter: &TransactionFilter) -> RepositoryResult<Option<Transaction>> {
        self.inner.find_one(filter).await
    }

    async fn update_one(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> RepositoryResult<bool> {
        if filter.status == Some(TransactionStatus::Pending) {
            let unguarded = TransactionFilter {
                key: filter.key.clone(),
                status: None,
            };
            self.inner.update_one(&unguarded, &self.winner).await?;
        }
        self.inner.update_one(filter, patch).await
    }

    async fn count(&self, filter: &TransactionFilter) -> RepositoryResult<u64> {
        self.inner.count(filter).await
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.inner.ping().await
    }
}

/// MTN-style provider: token endpoint on `auth_url`, product calls on `base_url`.
pub fn momo_provider(base_url: &str, auth_url: &str) -> Value {
    json!({
        "name": "MTN MoMo",
        "base_url": base_url,
        "auth_base_url": auth_url,
        "target_environment": "sandbox",
        "collection": {
            "subscription_key": "c-key",
            "api_user": "c-user",
            "api_key": "c-secret"
        },
        "disbursement": {
            "subscription_key": "d-key",
            "api_user": "d-user",
            "api_key": "d-secret"
        }
    })
}

pub fn card_provider(base_url: &str) -> Value {
    json!({
        "name": "Card Checkout",
        "base_url": base_url,
        "redirect_url": "https://merchant.test/return",
        "secret_key": "FLWSECK-test",
        "webhook_secret": "hash-1"
    })
}

pub fn sms_provider(base_url: &str) -> Value {
    json!({
        "name": "Bulk SMS",
        "base_url": base_url,
        "api_key": "sms-key",
        "sender_id": "PAYGATE"
    })
}

pub fn collect_body(py_ref: &str) -> Value {
    json!({
        "msisdn": "256771234567",
        "amount": "1000",
        "currency": "UGX",
        "pyRef": py_ref,
    })
}
