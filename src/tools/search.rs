use crate::error::Result;
use crate::search::SearchClient;
use crate::tools::{
    optional_u64, required_str, ParameterSpec, Parameters, ToolDescriptor, ToolHandler, ToolKind,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct WebSearchTool {
    client: Arc<SearchClient>,
}

impl WebSearchTool {
    pub const NAME: &'static str = "brave_web_search";
    const DEFAULT_COUNT: u64 = 10;

    pub fn new(client: Arc<SearchClient>) -> Self {
        Self { client }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            ToolKind::Search,
            "Search the web using Brave Search API",
        )
        .param("query", ParameterSpec::string("Search query").required())
        .param(
            "count",
            ParameterSpec::integer("Number of results (max 20)").with_default(Self::DEFAULT_COUNT),
        )
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn execute(&self, parameters: Parameters) -> Result<Value> {
        let query = required_str(&parameters, "query")?;
        let count = optional_u64(&parameters, "count")?.unwrap_or(Self::DEFAULT_COUNT);

        self.client.web_search(query, count).await
    }
}

pub struct LocalSearchTool {
    client: Arc<SearchClient>,
}

impl LocalSearchTool {
    pub const NAME: &'static str = "brave_local_search";
    const DEFAULT_COUNT: u64 = 5;

    pub fn new(client: Arc<SearchClient>) -> Self {
        Self { client }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            ToolKind::Search,
            "Search for local businesses using Brave Search API, falling back to web search",
        )
        .param("query", ParameterSpec::string("Search query").required())
        .param(
            "count",
            ParameterSpec::integer("Number of results (max 20)").with_default(Self::DEFAULT_COUNT),
        )
    }
}

#[async_trait]
impl ToolHandler for LocalSearchTool {
    async fn execute(&self, parameters: Parameters) -> Result<Value> {
        let query = required_str(&parameters, "query")?;
        let count = optional_u64(&parameters, "count")?.unwrap_or(Self::DEFAULT_COUNT);

        self.client.local_search(query, count).await
    }
}
