//! Transaction domain entity.
//! Framework-agnostic representation of a gateway transaction and its lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Collection,
    Payout,
    Purchase,
    Validation,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Collection => "COLLECTION",
            TransactionType::Payout => "PAYOUT",
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Validation => "VALIDATION",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COLLECTION" => Ok(TransactionType::Collection),
            "PAYOUT" => Ok(TransactionType::Payout),
            "PURCHASE" => Ok(TransactionType::Purchase),
            "VALIDATION" => Ok(TransactionType::Validation),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Lifecycle status. `Pending` is the only non-terminal value.
///
/// Upstream statuses the gateway does not recognise are kept verbatim in
/// `Other`, since the provider is authoritative for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Logged,
    Other(String),
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Logged => "LOGGED",
            TransactionStatus::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl From<String> for TransactionStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "PENDING" => TransactionStatus::Pending,
            "COMPLETED" => TransactionStatus::Completed,
            "FAILED" => TransactionStatus::Failed,
            "CANCELLED" => TransactionStatus::Cancelled,
            "LOGGED" => TransactionStatus::Logged,
            _ => TransactionStatus::Other(raw),
        }
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path moved the transaction into its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletedBy {
    Request,
    Webhook,
    TransCheck,
}

impl CompletedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletedBy::Request => "REQUEST",
            CompletedBy::Webhook => "WEBHOOK",
            CompletedBy::TransCheck => "TRANS_CHECK",
        }
    }
}

impl FromStr for CompletedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUEST" => Ok(CompletedBy::Request),
            "WEBHOOK" => Ok(CompletedBy::Webhook),
            "TRANS_CHECK" => Ok(CompletedBy::TransCheck),
            other => Err(format!("unknown completion path: {}", other)),
        }
    }
}

/// Domain entity representing a gateway transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub gateway_ref: Uuid,
    pub py_ref: String,
    pub provider: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub completed_by: Option<CompletedBy>,
    pub amount: BigDecimal,
    pub currency: String,
    pub counterparty: Option<String>,
    /// Reference the gateway sent upstream (`X-Reference-Id`, `tx_ref`).
    pub provider_ref: Option<String>,
    /// Identifier assigned by the provider once it settles the transaction.
    pub financial_id: Option<String>,
    pub message: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway_ref: Uuid,
        py_ref: String,
        provider: String,
        transaction_type: TransactionType,
        amount: BigDecimal,
        currency: String,
        counterparty: Option<String>,
        provider_ref: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            gateway_ref,
            py_ref,
            provider,
            transaction_type,
            status: TransactionStatus::Pending,
            completed_by: None,
            amount,
            currency,
            counterparty,
            provider_ref,
            financial_id: None,
            message: None,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Correlation view returned to callers.
    pub fn summary(&self) -> Value {
        json!({
            "status": self.status.as_str(),
            "gateway_ref": self.gateway_ref,
            "py_ref": self.py_ref,
            "provider": self.provider,
            "type": self.transaction_type,
            "completed_by": self.completed_by,
            "financial_id": self.financial_id,
        })
    }

    /// Applies a patch the way a document store would: set fields, merge metadata.
    pub fn apply(&mut self, patch: &TransactionPatch) {
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        if let Some(completed_by) = patch.completed_by {
            self.completed_by = Some(completed_by);
        }
        if let Some(financial_id) = &patch.financial_id {
            self.financial_id = Some(financial_id.clone());
        }
        if let Some(message) = &patch.message {
            self.message = Some(message.clone());
        }
        if let Some(metadata) = &patch.metadata {
            merge_metadata(&mut self.metadata, metadata);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        self.updated_at = Utc::now();
    }
}

fn merge_metadata(target: &mut Value, incoming: &Value) {
    match (target.as_object_mut(), incoming.as_object()) {
        (Some(existing), Some(fields)) => {
            for (key, value) in fields {
                existing.insert(key.clone(), value.clone());
            }
        }
        _ => *target = incoming.clone(),
    }
}

/// Key a ledger lookup or update matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKey {
    GatewayRef(Uuid),
    PyRef(String),
    ProviderRef(String),
}

/// Document-store style filter: a key plus an optional status guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    pub key: TransactionKey,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn gateway_ref(gateway_ref: Uuid) -> Self {
        Self {
            key: TransactionKey::GatewayRef(gateway_ref),
            status: None,
        }
    }

    pub fn py_ref(py_ref: impl Into<String>) -> Self {
        Self {
            key: TransactionKey::PyRef(py_ref.into()),
            status: None,
        }
    }

    pub fn provider_ref(provider_ref: impl Into<String>) -> Self {
        Self {
            key: TransactionKey::ProviderRef(provider_ref.into()),
            status: None,
        }
    }

    /// Restrict the match to records currently in `status`.
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        let key_matches = match &self.key {
            TransactionKey::GatewayRef(id) => tx.gateway_ref == *id,
            TransactionKey::PyRef(py_ref) => tx.py_ref == *py_ref,
            TransactionKey::ProviderRef(provider_ref) => {
                tx.provider_ref.as_deref() == Some(provider_ref.as_str())
            }
        };
        key_matches && self.status.as_ref().map_or(true, |status| tx.status == *status)
    }
}

/// Partial update. Absent fields are left untouched; metadata is merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    pub completed_by: Option<CompletedBy>,
    pub financial_id: Option<String>,
    pub message: Option<String>,
    pub metadata: Option<Value>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    /// Moves a record into a terminal state on behalf of `completed_by`.
    pub fn terminal(status: TransactionStatus, completed_by: CompletedBy) -> Self {
        Self {
            status: Some(status),
            completed_by: Some(completed_by),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn financial_id(mut self, financial_id: Option<String>) -> Self {
        self.financial_id = financial_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            "abc-1".to_string(),
            "mtn-momo".to_string(),
            TransactionType::Collection,
            BigDecimal::from(1000),
            "UGX".to_string(),
            Some("256700000000".to_string()),
            Some("ref-1".to_string()),
        )
    }

    #[test]
    fn new_transactions_are_pending() {
        let tx = sample();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(!tx.status.is_terminal());
        assert!(tx.completed_by.is_none());
    }

    #[test]
    fn status_round_trips_unknown_values_verbatim() {
        assert_eq!(TransactionStatus::from("failed".to_string()), TransactionStatus::Failed);
        let other = TransactionStatus::from("REJECTED".to_string());
        assert_eq!(other, TransactionStatus::Other("REJECTED".to_string()));
        assert!(other.is_terminal());
        assert_eq!(String::from(other), "REJECTED");
    }

    #[test]
    fn status_serializes_as_plain_string() {
        let value = serde_json::to_value(TransactionStatus::Cancelled).unwrap();
        assert_eq!(value, json!("CANCELLED"));
        let value = serde_json::to_value(CompletedBy::TransCheck).unwrap();
        assert_eq!(value, json!("TRANS_CHECK"));
    }

    #[test]
    fn filter_honours_status_guard() {
        let tx = sample();
        let filter = TransactionFilter::gateway_ref(tx.gateway_ref);
        assert!(filter.matches(&tx));
        assert!(filter
            .clone()
            .with_status(TransactionStatus::Pending)
            .matches(&tx));
        assert!(!filter.with_status(TransactionStatus::Completed).matches(&tx));
        assert!(TransactionFilter::provider_ref("ref-1").matches(&tx));
        assert!(!TransactionFilter::py_ref("abc-2").matches(&tx));
    }

    #[test]
    fn patch_merges_metadata() {
        let mut tx = sample();
        tx.apply(&TransactionPatch::default().metadata(json!({"link": "https://pay"})));
        tx.apply(
            &TransactionPatch::terminal(TransactionStatus::Completed, CompletedBy::Webhook)
                .metadata(json!({"status": "SUCCESSFUL"})),
        );

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.completed_by, Some(CompletedBy::Webhook));
        assert!(tx.completed_at.is_some());
        assert_eq!(tx.metadata["link"], "https://pay");
        assert_eq!(tx.metadata["status"], "SUCCESSFUL");
    }

    #[test]
    fn transaction_type_parses_case_insensitively() {
        assert_eq!("payout".parse::<TransactionType>(), Ok(TransactionType::Payout));
        assert!("refund".parse::<TransactionType>().is_err());
    }
}
