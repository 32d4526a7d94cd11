use std::sync::Arc;
use std::time::Duration;

use crate::domain::MessageLogEntry;
use crate::ports::{MessageLog, TransactionRepository};

/// Shared collaborators, built once at startup and handed to the admission gate,
/// every provider adapter and the reconciliation engine.
pub struct GatewayContext {
    pub transactions: Arc<dyn TransactionRepository>,
    pub messages: Arc<dyn MessageLog>,
    pub http: reqwest::Client,
}

impl GatewayContext {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        messages: Arc<dyn MessageLog>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            transactions,
            messages,
            http,
        }
    }

    /// Outbound client. Without `upstream_timeout` calls are unbounded and only
    /// the inbound request deadline applies.
    pub fn http_client(upstream_timeout: Option<Duration>) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = upstream_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Writes to the message log. A log write failure never changes the outcome
    /// of the operation being logged.
    pub async fn audit(&self, entry: MessageLogEntry) {
        if let Err(e) = self.messages.insert(&entry).await {
            tracing::error!(
                operation = %entry.operation,
                code = entry.code,
                "Failed to write message log entry: {}",
                e
            );
        }
    }
}
