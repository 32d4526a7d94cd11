pub mod transactions;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub ledger: String,
    pub providers: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = match state.context.transactions.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!("Ledger health check failed: {}", e);
            "disconnected"
        }
    };

    let health_response = HealthStatus {
        status: if ledger == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger: ledger.to_string(),
        providers: state.registry.codes(),
    };

    // Return 503 if the ledger is down, 200 otherwise
    let status_code = if ledger == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
