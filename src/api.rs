pub mod envelope;
pub mod error;
pub mod error_handler;
pub mod health_checks;
pub mod validated_json;

pub use envelope::{ApiResponse, Envelope};
pub use error::ApiError;
pub use validated_json::ValidatedJson;
