use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::request_logger::GatewayRef;
use crate::domain::TransactionFilter;
use crate::error::GatewayError;
use crate::providers::{reject, GatewayRequest, ProviderAdapter, ProviderRegistry, PROVIDER_HEADER};
use crate::validation::{detail_string, Details, ValidationError};
use crate::AppState;

const OPERATION: &str = "admission";

/// A request that passed the gate, with its adapter resolved.
#[derive(Clone)]
pub struct Admitted {
    pub request: GatewayRequest,
    pub provider: Arc<dyn ProviderAdapter>,
}

/// Resolves the adapter named by the `x-provider` header.
pub fn select_provider(
    registry: &ProviderRegistry,
    headers: &HeaderMap,
) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
    let code = headers
        .get(PROVIDER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or(GatewayError::MissingProvider)?;
    registry
        .get(code)
        .ok_or_else(|| GatewayError::UnknownProvider(code.to_string()))
}

/// Reads a request body as a details map. An empty body is an empty map.
pub fn parse_details(bytes: &[u8]) -> Result<Details, GatewayError> {
    if bytes.is_empty() {
        return Ok(Details::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(details)) => Ok(details),
        _ => Err(ValidationError::new("body", "must be a JSON object").into()),
    }
}

async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    request: &GatewayRequest,
) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
    let py_ref = request
        .py_ref()
        .ok_or_else(|| ValidationError::new("pyRef", "is required"))?;

    let existing = state
        .context
        .transactions
        .count(&TransactionFilter::py_ref(py_ref.clone()))
        .await?;
    if existing > 0 {
        return Err(GatewayError::duplicate_reference(&py_ref));
    }

    select_provider(&state.registry, headers)
}

pub async fn admission_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let gateway_ref = req
        .extensions()
        .get::<GatewayRef>()
        .map(|GatewayRef(id)| *id)
        .unwrap_or_else(Uuid::new_v4);
    let provider_code = req
        .headers()
        .get(PROVIDER_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let (mut parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = ValidationError::new("body", format!("could not be read: {}", e));
            let data = json!({ "gateway_ref": gateway_ref });
            return reject(&state.context, &provider_code, OPERATION, gateway_ref, error.into(), data)
                .await
                .into_response();
        }
    };

    let details = match parse_details(&bytes) {
        Ok(details) => details,
        Err(error) => {
            let data = json!({ "gateway_ref": gateway_ref });
            return reject(&state.context, &provider_code, OPERATION, gateway_ref, error, data)
                .await
                .into_response();
        }
    };
    let request = GatewayRequest::new(gateway_ref, details);

    let provider = match admit(&state, &parts.headers, &request).await {
        Ok(provider) => provider,
        Err(error) => {
            return reject(
                &state.context,
                &provider_code,
                OPERATION,
                gateway_ref,
                error,
                request.correlation(),
            )
            .await
            .into_response()
        }
    };

    tracing::debug!(
        gateway_ref = %gateway_ref,
        provider = %provider.code(),
        py_ref = ?detail_string(&request.details, "pyRef"),
        "Request admitted"
    );

    parts.extensions.insert(Admitted { request, provider });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
