use crate::error::{AppError, Result};
use crate::fetch::{FetchEngine, FetchRequest};
use crate::tools::{ParameterSpec, Parameters, ToolDescriptor, ToolHandler, ToolKind};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct FetchTool {
    engine: Arc<FetchEngine>,
}

impl FetchTool {
    pub const NAME: &'static str = "fetch";

    pub fn new(engine: Arc<FetchEngine>) -> Self {
        Self { engine }
    }

    /// Schema defaults mirror the engine's configured defaults.
    pub fn descriptor(engine: &FetchEngine) -> ToolDescriptor {
        let defaults = engine.defaults();
        ToolDescriptor::new(
            Self::NAME,
            ToolKind::Context,
            "Fetch an arbitrary URL over HTTP(S) and return status, headers and body",
        )
        .param("url", ParameterSpec::string("Absolute http(s) URL").required())
        .param(
            "method",
            ParameterSpec::string("HTTP method").with_default("GET"),
        )
        .param("headers", ParameterSpec::object("Extra request headers"))
        .param(
            "body",
            ParameterSpec::object("Request body; objects are sent as JSON, strings as-is"),
        )
        .param(
            "timeout",
            ParameterSpec::integer("Timeout in seconds").with_default(defaults.timeout_secs),
        )
        .param(
            "follow_redirects",
            ParameterSpec::boolean("Follow redirects").with_default(defaults.follow_redirects),
        )
        .param(
            "verify_ssl",
            ParameterSpec::boolean("Verify TLS certificates").with_default(defaults.verify_tls),
        )
    }
}

#[async_trait]
impl ToolHandler for FetchTool {
    async fn execute(&self, parameters: Parameters) -> Result<Value> {
        let request: FetchRequest = serde_json::from_value(Value::Object(parameters))
            .map_err(|e| AppError::ValidationError(format!("Invalid fetch parameters: {}", e)))?;

        let result = self.engine.fetch(request).await?;

        serde_json::to_value(result).map_err(|e| AppError::ExecutionError {
            tool: Self::NAME.to_string(),
            message: format!("Failed to encode fetch result: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchDefaults;
    use serde_json::json;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool() -> FetchTool {
        FetchTool::new(Arc::new(FetchEngine::new(FetchDefaults::default())))
    }

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_tool_returns_result_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let value = tool()
            .execute(params(json!({"url": format!("{}/page", server.uri())})))
            .await
            .unwrap();

        assert_eq!(value["status"], 200);
        assert_eq!(value["body"], "<html></html>");
        assert_eq!(value["redirect_chain"], json!([]));
        assert!(value["timing"]["total_seconds"].is_number());
    }

    #[tokio::test]
    async fn test_malformed_parameters_are_validation_errors() {
        let err = tool()
            .execute(params(json!({"url": "http://example.com", "timeout": "soon"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_keeps_fetch_status() {
        let err = tool()
            .execute(params(json!({"url": "not-a-url"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FetchError { status_code: 400, .. }));
    }

    #[test]
    fn test_descriptor_reflects_engine_defaults() {
        let engine = FetchEngine::new(FetchDefaults {
            timeout_secs: 12,
            ..FetchDefaults::default()
        });
        let descriptor = FetchTool::descriptor(&engine);

        assert!(descriptor.parameters["url"].required);
        assert_eq!(descriptor.parameters["timeout"].default, Some(json!(12)));
    }

    #[test]
    fn test_descriptor_uses_json_schema_types() {
        let descriptor = FetchTool::descriptor(&FetchEngine::new(FetchDefaults::default()));
        let schema_types = ["string", "integer", "number", "boolean", "object", "array"];

        for (name, spec) in &descriptor.parameters {
            assert!(
                schema_types.contains(&spec.kind.as_str()),
                "parameter {} has type {}",
                name,
                spec.kind
            );
        }
        assert_eq!(descriptor.parameters["body"].kind, "object");
    }

    #[tokio::test]
    async fn test_text_body_accepted_despite_object_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(body_string("plain text"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let value = tool()
            .execute(params(json!({
                "url": format!("{}/echo", server.uri()),
                "method": "POST",
                "body": "plain text"
            })))
            .await
            .unwrap();
        assert_eq!(value["status"], 200);
    }
}
