use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::envelope::ApiResponse;
use crate::error::GatewayError;
use crate::middleware::admission::parse_details;
use crate::middleware::{select_provider, Admitted, GatewayRef};
use crate::providers::{reject, GatewayRequest, ProviderAdapter};
use crate::validation::Details;
use crate::AppState;

/// Runs `work` on its own task bounded by the gateway deadline. On expiry the
/// caller gets 408 while the task keeps running and may still write to the
/// ledger.
pub async fn with_deadline<F>(deadline: Duration, gateway_ref: Uuid, work: F) -> ApiResponse
where
    F: Future<Output = ApiResponse> + Send + 'static,
{
    let task = tokio::spawn(work);
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(gateway_ref = %gateway_ref, "Request task failed: {}", e);
            ApiResponse::new(500, "Internal server error", Some(json!({ "gateway_ref": gateway_ref })))
        }
        Err(_) => {
            tracing::warn!(
                gateway_ref = %gateway_ref,
                deadline_ms = deadline.as_millis(),
                "Request deadline exceeded; upstream call left running"
            );
            ApiResponse::from(GatewayError::Timeout).with_data(json!({ "gateway_ref": gateway_ref }))
        }
    }
}

pub async fn collect(
    State(state): State<AppState>,
    Extension(admitted): Extension<Admitted>,
) -> ApiResponse {
    let Admitted { request, provider } = admitted;
    with_deadline(state.request_timeout, request.gateway_ref, async move {
        provider.collect(&request).await
    })
    .await
}

pub async fn transfer(
    State(state): State<AppState>,
    Extension(admitted): Extension<Admitted>,
) -> ApiResponse {
    let Admitted { request, provider } = admitted;
    with_deadline(state.request_timeout, request.gateway_ref, async move {
        provider.transfer(&request).await
    })
    .await
}

/// Resolves the provider for routes that do not create transactions.
async fn resolve(
    state: &AppState,
    gateway_ref: Uuid,
    headers: &HeaderMap,
    operation: &str,
) -> Result<std::sync::Arc<dyn ProviderAdapter>, ApiResponse> {
    match select_provider(&state.registry, headers) {
        Ok(provider) => Ok(provider),
        Err(error) => {
            let data = json!({ "gateway_ref": gateway_ref });
            Err(reject(&state.context, "", operation, gateway_ref, error, data).await)
        }
    }
}

async fn body_details(
    state: &AppState,
    gateway_ref: Uuid,
    body: &[u8],
    operation: &str,
) -> Result<Details, ApiResponse> {
    match parse_details(body) {
        Ok(details) => Ok(details),
        Err(error) => {
            let data = json!({ "gateway_ref": gateway_ref });
            Err(reject(&state.context, "", operation, gateway_ref, error, data).await)
        }
    }
}

pub async fn validate_account(
    State(state): State<AppState>,
    Extension(GatewayRef(gateway_ref)): Extension<GatewayRef>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    let operation = "validateAccount";
    let provider = match resolve(&state, gateway_ref, &headers, operation).await {
        Ok(provider) => provider,
        Err(response) => return response,
    };
    let details = match body_details(&state, gateway_ref, &body, operation).await {
        Ok(details) => details,
        Err(response) => return response,
    };
    let request = GatewayRequest::new(gateway_ref, details);
    with_deadline(state.request_timeout, gateway_ref, async move {
        provider.validate_account(&request).await
    })
    .await
}

pub async fn check_balance(
    State(state): State<AppState>,
    Extension(GatewayRef(gateway_ref)): Extension<GatewayRef>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResponse {
    let provider = match resolve(&state, gateway_ref, &headers, "checkBalance").await {
        Ok(provider) => provider,
        Err(response) => return response,
    };
    let details: Details = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    let request = GatewayRequest::new(gateway_ref, details);
    with_deadline(state.request_timeout, gateway_ref, async move {
        provider.check_balance(&request).await
    })
    .await
}

pub async fn send_sms(
    State(state): State<AppState>,
    Extension(GatewayRef(gateway_ref)): Extension<GatewayRef>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    let operation = "sendSms";
    let provider = match resolve(&state, gateway_ref, &headers, operation).await {
        Ok(provider) => provider,
        Err(response) => return response,
    };
    let details = match body_details(&state, gateway_ref, &body, operation).await {
        Ok(details) => details,
        Err(response) => return response,
    };
    let request = GatewayRequest::new(gateway_ref, details);
    with_deadline(state.request_timeout, gateway_ref, async move {
        provider.send_sms(&request).await
    })
    .await
}

pub async fn check_status(
    State(state): State<AppState>,
    Extension(GatewayRef(gateway_ref)): Extension<GatewayRef>,
    Path(py_ref): Path<String>,
) -> ApiResponse {
    let engine = state.engine.clone();
    with_deadline(state.request_timeout, gateway_ref, async move {
        engine.check_transaction_status(gateway_ref, &py_ref).await
    })
    .await
}
