//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::{
    CompletedBy, Transaction, TransactionFilter, TransactionKey, TransactionPatch,
    TransactionStatus, TransactionType,
};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const COLUMNS: &str = "gateway_ref, py_ref, provider, transaction_type, status, completed_by, \
     amount, currency, counterparty, provider_ref, financial_id, message, metadata, \
     created_at, updated_at, completed_at";

/// Postgres-backed ledger. `py_ref` carries a unique index, so a create that
/// races past the admission count check still fails with `Duplicate`.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    match &filter.key {
        TransactionKey::GatewayRef(id) => {
            builder.push("gateway_ref = ").push_bind(*id);
        }
        TransactionKey::PyRef(py_ref) => {
            builder.push("py_ref = ").push_bind(py_ref.clone());
        }
        TransactionKey::ProviderRef(provider_ref) => {
            builder.push("provider_ref = ").push_bind(provider_ref.clone());
        }
    }
    if let Some(status) = &filter.status {
        builder
            .push(" AND status = ")
            .push_bind(status.as_str().to_string());
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert_one(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tx.gateway_ref)
        .bind(&tx.py_ref)
        .bind(&tx.provider)
        .bind(tx.transaction_type.as_str())
        .bind(tx.status.as_str())
        .bind(tx.completed_by.map(|c| c.as_str()))
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(&tx.counterparty)
        .bind(&tx.provider_ref)
        .bind(&tx.financial_id)
        .bind(&tx.message)
        .bind(&tx.metadata)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.completed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn find_one(&self, filter: &TransactionFilter) -> RepositoryResult<Option<Transaction>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COLUMNS} FROM transactions WHERE "
        ));
        push_filter(&mut builder, filter);
        builder.push(" LIMIT 1");

        let row = builder
            .build_query_as::<TransactionRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_one(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> RepositoryResult<bool> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE transactions SET updated_at = NOW()");
        if let Some(status) = &patch.status {
            builder
                .push(", status = ")
                .push_bind(status.as_str().to_string());
        }
        if let Some(completed_by) = patch.completed_by {
            builder
                .push(", completed_by = ")
                .push_bind(completed_by.as_str());
        }
        if let Some(financial_id) = &patch.financial_id {
            builder
                .push(", financial_id = ")
                .push_bind(financial_id.clone());
        }
        if let Some(message) = &patch.message {
            builder.push(", message = ").push_bind(message.clone());
        }
        if let Some(metadata) = &patch.metadata {
            builder
                .push(", metadata = COALESCE(metadata, '{}'::jsonb) || ")
                .push_bind(metadata.clone());
        }
        if let Some(completed_at) = patch.completed_at {
            builder.push(", completed_at = ").push_bind(completed_at);
        }

        // Single-row semantics: target the first match only.
        builder.push(" WHERE gateway_ref = (SELECT gateway_ref FROM transactions WHERE ");
        push_filter(&mut builder, filter);
        builder.push(" LIMIT 1)");
        if let Some(status) = &filter.status {
            builder
                .push(" AND status = ")
                .push_bind(status.as_str().to_string());
        }

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, filter: &TransactionFilter) -> RepositoryResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM transactions WHERE ");
        push_filter(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    gateway_ref: Uuid,
    py_ref: String,
    provider: String,
    transaction_type: String,
    status: String,
    completed_by: Option<String>,
    amount: bigdecimal::BigDecimal,
    currency: String,
    counterparty: Option<String>,
    provider_ref: Option<String>,
    financial_id: Option<String>,
    message: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let transaction_type = self
            .transaction_type
            .parse::<TransactionType>()
            .map_err(RepositoryError::Storage)?;
        let completed_by = self
            .completed_by
            .map(|raw| raw.parse::<CompletedBy>())
            .transpose()
            .map_err(RepositoryError::Storage)?;

        Ok(Transaction {
            gateway_ref: self.gateway_ref,
            py_ref: self.py_ref,
            provider: self.provider,
            transaction_type,
            status: TransactionStatus::from(self.status),
            completed_by,
            amount: self.amount,
            currency: self.currency,
            counterparty: self.counterparty,
            provider_ref: self.provider_ref,
            financial_id: self.financial_id,
            message: self.message,
            metadata: self.metadata.unwrap_or_else(|| serde_json::json!({})),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}
