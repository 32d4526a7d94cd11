pub mod message_log;
pub mod transaction;

pub use message_log::MessageLogEntry;
pub use transaction::{
    CompletedBy, Transaction, TransactionFilter, TransactionKey, TransactionPatch,
    TransactionStatus, TransactionType,
};
