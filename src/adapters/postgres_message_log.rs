use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::MessageLogEntry;
use crate::ports::{MessageLog, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresMessageLog {
    pool: PgPool,
}

impl PostgresMessageLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageLog for PostgresMessageLog {
    async fn insert(&self, entry: &MessageLogEntry) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO message_logs (
                id, gateway_ref, provider, operation, code, message, context, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.gateway_ref)
        .bind(&entry.provider)
        .bind(&entry.operation)
        .bind(i32::from(entry.code))
        .bind(&entry.message)
        .bind(&entry.context)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}
