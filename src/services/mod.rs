pub mod reconciliation;

pub use reconciliation::ReconciliationEngine;
