use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{MessageLogEntry, Transaction, TransactionFilter, TransactionPatch};
use crate::ports::{MessageLog, RepositoryError, RepositoryResult, TransactionRepository};

/// A thread-safe in-memory ledger.
///
/// Used when no `DATABASE_URL` is configured and throughout the test suite.
/// The `py_ref` uniqueness check and the insert happen under one write lock.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert_one(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        if transactions.values().any(|existing| existing.py_ref == tx.py_ref) {
            return Err(RepositoryError::Duplicate(tx.py_ref.clone()));
        }
        if transactions.contains_key(&tx.gateway_ref) {
            return Err(RepositoryError::Duplicate(tx.gateway_ref.to_string()));
        }
        transactions.insert(tx.gateway_ref, tx.clone());
        Ok(tx.clone())
    }

    async fn find_one(&self, filter: &TransactionFilter) -> RepositoryResult<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().find(|tx| filter.matches(tx)).cloned())
    }

    async fn update_one(
        &self,
        filter: &TransactionFilter,
        patch: &TransactionPatch,
    ) -> RepositoryResult<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.values_mut().find(|tx| filter.matches(tx)) {
            Some(tx) => {
                tx.apply(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self, filter: &TransactionFilter) -> RepositoryResult<u64> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().filter(|tx| filter.matches(tx)).count() as u64)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

/// In-memory audit log. Entries can be inspected, which the tests rely on.
#[derive(Default, Clone)]
pub struct InMemoryMessageLog {
    entries: Arc<RwLock<Vec<MessageLogEntry>>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<MessageLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn insert(&self, entry: &MessageLogEntry) -> RepositoryResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
