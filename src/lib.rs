//! Toolgate - tool-dispatch gateway
//!
//! Exposes a uniform "execute tool X with parameters Y" contract and routes
//! each call to a rate-limited web search client, a generic HTTP fetcher or
//! a persisted key-value memory store. The library holds every component so
//! integration tests can drive the same router the binary serves.

pub mod config;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod persistence;
pub mod search;
pub mod server;
pub mod state;
pub mod tools;

// Re-export key types for convenience
pub use config::Config;
pub use error::{AppError, Result};
pub use fetch::{FetchEngine, FetchRequest, FetchResult};
pub use handlers::router;
pub use persistence::{MemoryRecord, MemoryStore};
pub use search::{RateLimiter, SearchClient};
pub use state::AppState;
pub use tools::{Dispatcher, McpRequest, McpResponse, ToolDescriptor, ToolRegistry};
