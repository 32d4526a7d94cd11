use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use uuid::Uuid;

use crate::envelope::ApiResponse;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_BODY_LOG_SIZE: usize = 16 * 1024;

/// Correlation id assigned to each inbound request and threaded through every
/// adapter call, ledger record and message log entry it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayRef(pub Uuid);

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogging {
    pub log_body: bool,
}

pub async fn request_logger_middleware(
    State(settings): State<RequestLogging>,
    mut req: Request,
    next: Next,
) -> Response {
    let gateway_ref = Uuid::new_v4();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    req.extensions_mut().insert(GatewayRef(gateway_ref));

    if settings.log_body {
        // Bounded by the body limit layer outside this middleware.
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!(
                    gateway_ref = %gateway_ref,
                    method = %method,
                    uri = %uri,
                    "Request body too large or failed to read"
                );
                let envelope = ApiResponse::new(
                    StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
                    "Request body too large",
                    None,
                );
                return with_request_id(envelope.into_response(), gateway_ref);
            }
        };

        let sanitized_body = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(json) => {
                let sanitized = crate::utils::sanitize::sanitize_json(&json);
                serde_json::to_string(&sanitized).unwrap_or_else(|_| "[invalid json]".to_string())
            }
            Err(_) => format!("[non-json, {} bytes]", bytes.len()),
        };

        tracing::info!(
            gateway_ref = %gateway_ref,
            method = %method,
            uri = %uri,
            body_size = bytes.len(),
            body = %truncate_for_log(&sanitized_body, MAX_BODY_LOG_SIZE),
            "Incoming request"
        );

        req = Request::from_parts(parts, Body::from(bytes));
    } else {
        tracing::info!(
            gateway_ref = %gateway_ref,
            method = %method,
            uri = %uri,
            "Incoming request"
        );
    }

    let response = next.run(req).await;

    tracing::info!(
        gateway_ref = %gateway_ref,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        latency_ms = start.elapsed().as_millis(),
        "Outgoing response"
    );

    with_request_id(response, gateway_ref)
}

fn truncate_for_log(body: &str, max_len: usize) -> String {
    if body.len() <= max_len {
        return body.to_string();
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated, {} bytes]", &body[..end], body.len())
}

fn with_request_id(response: Response, gateway_ref: Uuid) -> Response {
    let (mut parts, body) = response.into_parts();
    if let Ok(value) = HeaderValue::from_str(&gateway_ref.to_string()) {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use axum::{routing::post, Extension, Router};
    use tower::ServiceExt;

    fn app(log_body: bool) -> Router {
        Router::new()
            .route(
                "/test",
                post(|Extension(GatewayRef(id)): Extension<GatewayRef>| async move { id.to_string() }),
            )
            .layer(axum::middleware::from_fn_with_state(
                RequestLogging { log_body },
                request_logger_middleware,
            ))
    }

    #[tokio::test]
    async fn test_request_logger_adds_request_id() {
        let response = app(false)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(header, String::from_utf8_lossy(&body));
    }

    #[tokio::test]
    async fn test_body_survives_logging() {
        let app = Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .layer(axum::middleware::from_fn_with_state(
                RequestLogging { log_body: true },
                request_logger_middleware,
            ));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(r#"{"msisdn":"256771234567"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"msisdn":"256771234567"}"#);
    }

    #[tokio::test]
    async fn test_large_body_is_accepted_when_logged() {
        let payload = format!(r#"{{"note":"{}"}}"#, "x".repeat(MAX_BODY_LOG_SIZE * 2));
        let app = Router::new()
            .route("/echo", post(|body: String| async move { body.len().to_string() }))
            .layer(axum::middleware::from_fn_with_state(
                RequestLogging { log_body: true },
                request_logger_middleware,
            ));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&body), payload.len().to_string());
    }

    #[test]
    fn test_logged_body_is_truncated_on_char_boundary() {
        assert_eq!(truncate_for_log("short", 16), "short");

        let logged = truncate_for_log("ééé", 3);
        assert_eq!(logged, "é...[truncated, 6 bytes]");
    }
}
