pub mod client;
pub mod rate_limit;

pub use client::{SearchClient, MAX_RESULT_COUNT};
pub use rate_limit::{RateLimitWindow, RateLimiter};
