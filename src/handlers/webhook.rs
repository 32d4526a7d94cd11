use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension,
};

use crate::envelope::ApiResponse;
use crate::middleware::GatewayRef;
use crate::AppState;

/// Provider push endpoint. Authenticated and parsed pushes are always
/// acknowledged with 200, matched or not.
pub async fn callback(
    State(state): State<AppState>,
    Extension(GatewayRef(gateway_ref)): Extension<GatewayRef>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    tracing::info!(gateway_ref = %gateway_ref, provider = %provider, "Webhook received");
    state
        .engine
        .handle_webhook(gateway_ref, &provider, &headers, &body)
        .await
}
