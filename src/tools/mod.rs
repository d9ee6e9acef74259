//! Tool descriptors and the handler capability every tool implements.
//!
//! A tool is a named capability with a declared parameter schema. The
//! [`registry`] maps names to descriptor + handler pairs and the
//! [`dispatcher`] resolves and invokes them.

pub mod dispatcher;
pub mod fetch;
pub mod memory;
pub mod registry;
pub mod search;

pub use dispatcher::{Dispatcher, McpContext, McpRequest, McpResponse};
pub use fetch::FetchTool;
pub use memory::MemoryTool;
pub use registry::{RegisteredTool, ToolRegistry};
pub use search::{LocalSearchTool, WebSearchTool};

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parameters passed to a tool invocation.
pub type Parameters = Map<String, Value>;

pub const DEFAULT_TOOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Search,
    Context,
    Custom,
}

/// Schema entry for a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Permitted values for string parameters.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl ParameterSpec {
    pub fn new(kind: &str, description: &str) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
            required: false,
            default: None,
            allowed: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::new("string", description)
    }

    pub fn integer(description: &str) -> Self {
        Self::new("integer", description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::new("boolean", description)
    }

    pub fn object(description: &str) -> Self {
        Self::new("object", description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// Immutable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
    pub version: String,
}

impl ToolDescriptor {
    pub fn new(name: &str, kind: ToolKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            parameters: BTreeMap::new(),
            version: DEFAULT_TOOL_VERSION.to_string(),
        }
    }

    pub fn param(mut self, name: &str, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.to_string(), spec);
        self
    }

    /// Reject parameter maps that miss a required entry or use a value
    /// outside a declared `enum`.
    pub fn validate(&self, parameters: &Parameters) -> Result<()> {
        for (name, spec) in &self.parameters {
            let value = parameters.get(name).filter(|v| !v.is_null());

            if spec.required && value.is_none() {
                return Err(AppError::ValidationError(format!(
                    "Missing required parameter '{}' for tool '{}'",
                    name, self.name
                )));
            }

            if let (Some(allowed), Some(Value::String(given))) = (&spec.allowed, value) {
                if !allowed.iter().any(|a| a == given) {
                    return Err(AppError::ValidationError(format!(
                        "Invalid value '{}' for parameter '{}', expected one of: {}",
                        given,
                        name,
                        allowed.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A uniformly invocable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, parameters: Parameters) -> Result<Value>;
}

/// Non-empty string parameter.
pub fn required_str<'a>(parameters: &'a Parameters, name: &str) -> Result<&'a str> {
    match optional_str(parameters, name)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::ValidationError(format!(
            "Parameter '{}' is required",
            name
        ))),
    }
}

pub fn optional_str<'a>(parameters: &'a Parameters, name: &str) -> Result<Option<&'a str>> {
    match parameters.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(AppError::ValidationError(format!(
            "Parameter '{}' must be a string",
            name
        ))),
    }
}

pub fn optional_u64(parameters: &Parameters, name: &str) -> Result<Option<u64>> {
    match parameters.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Parameter '{}' must be a non-negative integer",
                name
            ))
        }),
    }
}

pub fn optional_object(parameters: &Parameters, name: &str) -> Result<Option<Map<String, Value>>> {
    match parameters.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(AppError::ValidationError(format!(
            "Parameter '{}' must be an object",
            name
        ))),
    }
}
