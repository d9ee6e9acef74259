//! Request routing from the MCP envelope to registered tools.

use crate::error::{AppError, Result};
use crate::tools::registry::ToolRegistry;
use crate::tools::Parameters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Caller-supplied context, echoed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpContext {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "now_iso")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub context: Option<McpContext>,
}

impl McpRequest {
    pub fn new(tool_name: &str, parameters: Parameters) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            parameters,
            context: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<McpContext>,
    pub metadata: Map<String, Value>,
}

/// Stateless router over a read-only registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one tool call.
    ///
    /// # Flow
    /// 1. Resolve the tool (`ToolNotFound` if absent)
    /// 2. Check declared required parameters
    /// 3. Run the handler in its own task; a panic becomes `ExecutionError`
    /// 4. Wrap the result with the echoed context and call metadata
    pub async fn dispatch(&self, request: McpRequest) -> Result<McpResponse> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "dispatch",
            tool = %request.tool_name,
            request_id = %request_id,
        );

        self.dispatch_inner(request, request_id)
            .instrument(span)
            .await
    }

    async fn dispatch_inner(&self, request: McpRequest, request_id: Uuid) -> Result<McpResponse> {
        let McpRequest {
            tool_name,
            parameters,
            context,
        } = request;

        let tool = self
            .registry
            .lookup(&tool_name)
            .ok_or_else(|| AppError::ToolNotFound(tool_name.clone()))?;

        tool.descriptor.validate(&parameters)?;

        let start = Instant::now();
        let handler = Arc::clone(&tool.handler);
        let outcome = tokio::spawn(
            async move { handler.execute(parameters).await }.in_current_span(),
        )
        .await;
        let elapsed = start.elapsed();

        metrics::counter!("tool_executions_total", "tool" => tool_name.clone()).increment(1);
        metrics::histogram!("tool_execution_latency_ms").record(elapsed.as_millis() as f64);

        let result = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                metrics::counter!("tool_errors_total", "tool" => tool_name.clone()).increment(1);
                return Err(classify(&tool_name, e));
            }
            Err(join) => {
                metrics::counter!("tool_errors_total", "tool" => tool_name.clone()).increment(1);
                return Err(AppError::ExecutionError {
                    tool: tool_name,
                    message: format!("Handler task failed: {}", join),
                });
            }
        };

        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Tool executed");

        let mut metadata = Map::new();
        metadata.insert("tool".to_string(), Value::String(tool_name));
        metadata.insert(
            "request_id".to_string(),
            Value::String(request_id.to_string()),
        );
        metadata.insert(
            "elapsed_ms".to_string(),
            Value::from(elapsed.as_millis() as u64),
        );

        Ok(McpResponse {
            result,
            context,
            metadata,
        })
    }
}

/// Typed caller-facing errors pass through; anything internal is reported
/// as a generic execution failure of the tool.
fn classify(tool: &str, err: AppError) -> AppError {
    match err {
        AppError::PersistenceError(message) => AppError::ExecutionError {
            tool: tool.to_string(),
            message,
        },
        other => other,
    }
}
