use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{MessageLogEntry, Transaction, TransactionFilter, TransactionPatch};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Duplicate(db.message().to_string())
            }
            other => RepositoryError::Storage(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fails with `Duplicate` when `py_ref` is already taken.
    async fn insert_one(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn find_one(&self, filter: &TransactionFilter) -> RepositoryResult<Option<Transaction>>;

    /// Returns whether a record matched. With a status guard on the filter this
    /// behaves as a compare-and-set on the current status.
    async fn update_one(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> RepositoryResult<bool>;

    async fn count(&self, filter: &TransactionFilter) -> RepositoryResult<u64>;

    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> RepositoryResult<()>;
}

#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn insert(&self, entry: &MessageLogEntry) -> RepositoryResult<()>;
}
