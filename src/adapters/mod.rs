pub mod in_memory;
pub mod postgres_message_log;
pub mod postgres_transaction_repository;

pub use in_memory::{InMemoryMessageLog, InMemoryTransactionRepository};
pub use postgres_message_log::PostgresMessageLog;
pub use postgres_transaction_repository::PostgresTransactionRepository;
