pub mod logging;
pub mod metrics;
pub mod request_id;

// Re-export commonly used items
pub use logging::{init_structured_logging, LogConfig, LogFormat};
pub use request_id::{MakeRequestUuid, X_REQUEST_ID};
