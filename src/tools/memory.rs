use crate::error::{AppError, Result};
use crate::persistence::MemoryStore;
use crate::tools::{
    optional_object, optional_str, required_str, ParameterSpec, Parameters, ToolDescriptor,
    ToolHandler, ToolKind,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAction {
    Add,
    Get,
    Search,
    Delete,
    List,
}

impl MemoryAction {
    pub const ALL: [&'static str; 5] = ["add", "get", "search", "delete", "list"];
}

impl FromStr for MemoryAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(Self::Add),
            "get" => Ok(Self::Get),
            "search" => Ok(Self::Search),
            "delete" => Ok(Self::Delete),
            "list" => Ok(Self::List),
            other => Err(AppError::ValidationError(format!(
                "Unknown action: {}",
                other
            ))),
        }
    }
}

pub struct MemoryTool {
    store: Arc<MemoryStore>,
}

impl MemoryTool {
    pub const NAME: &'static str = "memory";

    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(Self::NAME, ToolKind::Custom, "Store and retrieve memories")
            .param(
                "action",
                ParameterSpec::string("Action to perform: add, get, search, delete, or list")
                    .required()
                    .one_of(&MemoryAction::ALL),
            )
            .param(
                "key",
                ParameterSpec::string("Key for the memory (required for add, get, delete)"),
            )
            .param(
                "content",
                ParameterSpec::string("Content to store (required for add; alias: value)"),
            )
            .param(
                "query",
                ParameterSpec::string("Search query (required for search)"),
            )
            .param("metadata", ParameterSpec::object("Optional metadata for the memory"))
    }

    async fn add(&self, parameters: &Parameters) -> Result<Value> {
        let key = optional_str(parameters, "key")?.filter(|k| !is_blank(k));
        let content = match optional_str(parameters, "content")? {
            Some(content) => Some(content),
            None => optional_str(parameters, "value")?,
        }
        .filter(|c| !is_blank(c));

        let (Some(key), Some(content)) = (key, content) else {
            return Err(AppError::ValidationError(
                "Key and content are required for add action".to_string(),
            ));
        };
        let metadata = optional_object(parameters, "metadata")?;

        let record = self.store.add(key, content, metadata).await;
        Ok(json!({
            "message": "Memory added successfully",
            "key": record.key,
            "timestamp": record.timestamp,
        }))
    }

    async fn get(&self, parameters: &Parameters) -> Result<Value> {
        let key = required_key(parameters, "get")?;
        let record = self
            .store
            .get(key)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Memory with key {} not found", key)))?;
        Ok(json!(record))
    }

    async fn search(&self, parameters: &Parameters) -> Result<Value> {
        let query = required_str(parameters, "query")
            .map_err(|_| AppError::ValidationError("Query is required for search action".to_string()))?;
        let results = self.store.search(query).await;
        Ok(json!({ "results": results }))
    }

    async fn delete(&self, parameters: &Parameters) -> Result<Value> {
        let key = required_key(parameters, "delete")?;
        if !self.store.delete(key).await {
            return Err(AppError::NotFound(format!(
                "Memory with key {} not found",
                key
            )));
        }
        Ok(json!({ "message": format!("Memory {} deleted successfully", key) }))
    }

    async fn list(&self) -> Result<Value> {
        let memories = self.store.list_all().await;
        Ok(json!({ "memories": memories }))
    }
}

/// Same blankness rule `required_str` applies, so every action accepts the
/// same keys.
fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn required_key<'a>(parameters: &'a Parameters, action: &str) -> Result<&'a str> {
    required_str(parameters, "key").map_err(|_| {
        AppError::ValidationError(format!("Key is required for {} action", action))
    })
}

#[async_trait]
impl ToolHandler for MemoryTool {
    async fn execute(&self, parameters: Parameters) -> Result<Value> {
        let action: MemoryAction = required_str(&parameters, "action")?.parse()?;
        tracing::debug!(?action, "Memory action");

        match action {
            MemoryAction::Add => self.add(&parameters).await,
            MemoryAction::Get => self.get(&parameters).await,
            MemoryAction::Search => self.search(&parameters).await,
            MemoryAction::Delete => self.delete(&parameters).await,
            MemoryAction::List => self.list().await,
        }
    }
}
