use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{
    endpoint, reject, scalar_text, status_text, GatewayRequest, ProviderAdapter, SmsDelivery,
};
use crate::config::ProviderConfig;
use crate::context::GatewayContext;
use crate::domain::MessageLogEntry;
use crate::envelope::ApiResponse;
use crate::error::GatewayError;
use crate::validation::{detail_string, require_detail, ValidationError, COUNTERPARTY_MAX_LEN};

pub const CODE: &str = "sms";

const MESSAGE_MAX_LEN: usize = 918;
const SENDER_MAX_LEN: usize = 11;

pub fn build(
    code: &str,
    config: ProviderConfig,
    ctx: Arc<GatewayContext>,
) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("provider {} needs an api_key", code))?;
    Ok(Arc::new(SmsAdapter {
        code: code.to_string(),
        api_key,
        config,
        ctx,
    }))
}

pub struct SmsAdapter {
    code: String,
    api_key: String,
    config: ProviderConfig,
    ctx: Arc<GatewayContext>,
}

impl SmsAdapter {
    fn message_body(&self, request: &GatewayRequest) -> Result<Value, ValidationError> {
        let details = &request.details;
        let to = require_detail(details, "msisdn", COUNTERPARTY_MAX_LEN)?;
        let message = require_detail(details, "message", MESSAGE_MAX_LEN)?;
        let from = detail_string(details, "from")
            .or_else(|| self.config.sender_id.clone())
            .ok_or_else(|| ValidationError::new("from", "is required"))?;
        if from.len() > SENDER_MAX_LEN {
            return Err(ValidationError::new(
                "from",
                format!("must be at most {} characters", SENDER_MAX_LEN),
            ));
        }

        Ok(json!({
            "from": from,
            "to": to,
            "message": message,
        }))
    }

    async fn deliver(&self, request: &GatewayRequest) -> Result<ApiResponse, GatewayError> {
        let body = self.message_body(request)?;
        let response = self
            .ctx
            .http
            .post(endpoint(&self.config.base_url, "messages"))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(format!("SMS delivery failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamRejected(status_text(status)));
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let message_id = scalar_text(&payload["id"]).or_else(|| scalar_text(&payload["message_id"]));
        let data = json!({
            "gateway_ref": request.gateway_ref,
            "to": body["to"],
            "message_id": message_id,
        });

        info!(gateway_ref = %request.gateway_ref, provider = %self.code, "SMS accepted");
        self.ctx
            .audit(
                MessageLogEntry::new("sendSms", 200, "SMS accepted")
                    .gateway_ref(request.gateway_ref)
                    .provider(&self.code)
                    .context(data.clone()),
            )
            .await;

        Ok(ApiResponse::ok("SMS sent", data))
    }
}

impl ProviderAdapter for SmsAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn sms_delivery(&self) -> Option<&dyn SmsDelivery> {
        Some(self)
    }
}

#[async_trait]
impl SmsDelivery for SmsAdapter {
    async fn send_sms(&self, request: &GatewayRequest) -> ApiResponse {
        match self.deliver(request).await {
            Ok(response) => response,
            Err(e) => {
                let data = json!({ "gateway_ref": request.gateway_ref });
                reject(&self.ctx, &self.code, "sendSms", request.gateway_ref, e, data).await
            }
        }
    }
}
