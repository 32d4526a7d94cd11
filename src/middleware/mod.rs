pub mod admission;
pub mod request_logger;

pub use admission::{admission_middleware, select_provider, Admitted};
pub use request_logger::{request_logger_middleware, GatewayRef, RequestLogging};
