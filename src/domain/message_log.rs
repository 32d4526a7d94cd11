use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: Uuid,
    pub gateway_ref: Option<Uuid>,
    pub provider: Option<String>,
    pub operation: String,
    pub code: u16,
    pub message: String,
    pub context: Value,
    pub created_at: DateTime<Utc>,
}

impl MessageLogEntry {
    pub fn new(operation: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            gateway_ref: None,
            provider: None,
            operation: operation.into(),
            code,
            message: message.into(),
            context: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn gateway_ref(mut self, gateway_ref: Uuid) -> Self {
        self.gateway_ref = Some(gateway_ref);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}
