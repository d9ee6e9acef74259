use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Default number of results to return
fn default_count() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_count")]
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Value>,
    pub total_count: u64,
}

/// POST /search - Plain web search without the MCP envelope.
///
/// Returns the provider's `web.results` list. Subject to the same rate
/// limit as the search tools.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let client = state.search.as_ref().ok_or_else(|| AppError::ExecutionError {
        tool: "search".to_string(),
        message: "Brave Search client not initialized. Make sure BRAVE_API_KEY is set."
            .to_string(),
    })?;

    if request.query.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Query cannot be empty".to_string(),
        ));
    }

    let data = client.web_search(&request.query, request.count).await?;

    let results = data
        .pointer("/web/results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total_count = data
        .pointer("/web/totalCount")
        .and_then(Value::as_u64)
        .unwrap_or(results.len() as u64);

    tracing::debug!(query = %request.query, results = results.len(), "Search completed");

    Ok(Json(SearchResponse {
        results,
        total_count,
    }))
}
