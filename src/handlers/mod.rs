pub mod execute;
pub mod health;
pub mod memory;
pub mod search;

pub use execute::{execute_handler, list_tools_handler};
pub use health::{health_handler, ready_handler};
pub use memory::{
    add_memory_handler, delete_memory_handler, get_memory_handler, list_memories_handler,
    search_memories_handler,
};
pub use search::search_handler;

use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Every service route, with state attached.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // MCP boundary
        .route("/mcp/tools", get(list_tools_handler))
        .route("/mcp/execute", post(execute_handler))
        // Direct endpoints
        .route("/search", post(search_handler))
        .route("/memory/add", post(add_memory_handler))
        .route("/memory/get/:key", get(get_memory_handler))
        .route("/memory/search", post(search_memories_handler))
        .route("/memory/delete/:key", delete(delete_memory_handler))
        .route("/memory/list", get(list_memories_handler))
        // Health endpoints
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
