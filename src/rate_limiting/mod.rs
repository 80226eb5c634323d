pub mod middleware;
pub mod rate_limit_state;

pub use middleware::rate_limit_middleware;
pub use rate_limit_state::{RateLimitConfig, RateLimitExceeded, RateLimitState, RateLimitStatus};
