use crate::error::Result;
use crate::state::AppState;
use crate::tools::{McpRequest, McpResponse, ToolDescriptor};
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// GET /mcp/tools - All registered tool descriptors, in registration order.
pub async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Json<ToolListResponse> {
    let tools: Vec<ToolDescriptor> = state.registry.list_all().into_iter().cloned().collect();
    tracing::debug!(count = tools.len(), "Listing tools");
    Json(ToolListResponse { tools })
}

/// POST /mcp/execute - Run one tool call through the dispatcher.
///
/// Failures come back as `{"error", "code"}` with the matching HTTP status.
pub async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpRequest>,
) -> Result<Json<McpResponse>> {
    state.dispatcher.dispatch(request).await.map(Json)
}
