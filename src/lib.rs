pub mod adapters;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod providers;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;

use crate::adapters::{
    InMemoryMessageLog, InMemoryTransactionRepository, PostgresMessageLog,
    PostgresTransactionRepository,
};
use crate::config::{Config, ProvidersConfig};
use crate::context::GatewayContext;
use crate::middleware::{admission_middleware, request_logger_middleware, RequestLogging};
use crate::providers::ProviderRegistry;
use crate::services::ReconciliationEngine;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<GatewayContext>,
    pub registry: ProviderRegistry,
    pub engine: ReconciliationEngine,
    pub request_timeout: Duration,
    pub logging: RequestLogging,
}

impl AppState {
    pub fn new(
        context: Arc<GatewayContext>,
        registry: ProviderRegistry,
        request_timeout: Duration,
        logging: RequestLogging,
    ) -> Self {
        let engine = ReconciliationEngine::new(context.clone(), registry.clone());
        Self {
            context,
            registry,
            engine,
            request_timeout,
            logging,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let gated = Router::new()
        .route("/v1/collect", post(handlers::transactions::collect))
        .route("/v1/transfer", post(handlers::transactions::transfer))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/accounts/validate", post(handlers::transactions::validate_account))
        .route("/v1/balance", get(handlers::transactions::check_balance))
        .route("/v1/sms", post(handlers::transactions::send_sms))
        .route(
            "/v1/transactions/:py_ref/status",
            get(handlers::transactions::check_status),
        )
        .route("/v1/webhooks/:provider", post(handlers::webhook::callback))
        .merge(gated)
        .layer(axum::middleware::from_fn_with_state(
            state.logging,
            request_logger_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Wires the ledger, message log and provider registry from configuration.
/// Without `DATABASE_URL` the gateway runs on the in-memory ledger.
pub async fn build_state(config: &Config, providers: &ProvidersConfig) -> anyhow::Result<AppState> {
    let http = GatewayContext::http_client(config.upstream_timeout)?;
    let context = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            GatewayContext::new(
                Arc::new(PostgresTransactionRepository::new(pool.clone())),
                Arc::new(PostgresMessageLog::new(pool)),
                http,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory ledger, records are lost on restart");
            GatewayContext::new(
                Arc::new(InMemoryTransactionRepository::new()),
                Arc::new(InMemoryMessageLog::new()),
                http,
            )
        }
    };
    let context = Arc::new(context);
    let registry = ProviderRegistry::from_config(providers, context.clone())?;

    Ok(AppState::new(
        context,
        registry,
        config.request_timeout,
        RequestLogging {
            log_body: config.log_request_body,
        },
    ))
}
