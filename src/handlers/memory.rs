//! Direct memory endpoints.
//!
//! These bypass the MCP envelope and always answer 200 with a
//! `{success, message, data}` body.

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct MemoryRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MemoryResponse {
    fn ok(message: Option<&str>, data: Option<Value>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.map(str::to_string),
            data,
        })
    }

    fn fail(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            message: Some(message.to_string()),
            data: None,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /memory/add
pub async fn add_memory_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MemoryRequest>,
) -> Json<MemoryResponse> {
    let (Some(key), Some(value)) = (non_empty(request.key), non_empty(request.value)) else {
        return MemoryResponse::fail("Both key and value are required");
    };

    state.memory.add(&key, &value, request.metadata).await;
    MemoryResponse::ok(Some("Memory added successfully"), None)
}

/// GET /memory/get/{key}
pub async fn get_memory_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<MemoryResponse> {
    match state.memory.get(&key).await {
        Some(record) => MemoryResponse::ok(None, Some(json!(record))),
        None => MemoryResponse::fail("Memory not found"),
    }
}

/// POST /memory/search
pub async fn search_memories_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MemoryRequest>,
) -> Json<MemoryResponse> {
    let Some(query) = non_empty(request.query) else {
        return MemoryResponse::fail("Query is required");
    };

    let results = state.memory.search(&query).await;
    MemoryResponse::ok(None, Some(json!({ "results": results })))
}

/// DELETE /memory/delete/{key}
pub async fn delete_memory_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<MemoryResponse> {
    if state.memory.delete(&key).await {
        MemoryResponse::ok(Some("Memory deleted successfully"), None)
    } else {
        MemoryResponse::fail("Memory not found")
    }
}

/// GET /memory/list
pub async fn list_memories_handler(State(state): State<Arc<AppState>>) -> Json<MemoryResponse> {
    let memories = state.memory.list_all().await;
    MemoryResponse::ok(None, Some(json!({ "memories": memories })))
}
