use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetch::{FetchDefaults, FetchEngine};
use crate::persistence::MemoryStore;
use crate::search::{RateLimiter, SearchClient};
use crate::tools::{
    Dispatcher, FetchTool, LocalSearchTool, MemoryTool, ToolRegistry, WebSearchTool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Service context shared across all request handlers.
///
/// Built once at startup; every component is reached through it rather than
/// through process-wide globals.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub registry: Arc<ToolRegistry>,
    /// Absent when no provider key is configured.
    pub search: Option<Arc<SearchClient>>,
    pub fetch: Arc<FetchEngine>,
    pub memory: Arc<MemoryStore>,
    /// Flag indicating the service is ready (tools registered)
    pub ready: AtomicBool,
    pub config: Arc<Config>,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Opens the memory store, prepares the fetch engine's pooled client and
    /// registers every available tool. Search tools are skipped, with a
    /// warning, when `BRAVE_API_KEY` is not set.
    pub fn new(config: Config) -> Result<Self> {
        let memory = Arc::new(MemoryStore::open(&config.memory_path));

        let fetch = Arc::new(FetchEngine::new(FetchDefaults::from(&config)));
        fetch.setup()?;

        let search = match &config.brave_api_key {
            Some(key) => {
                let http = reqwest::Client::builder()
                    .build()
                    .map_err(|e| AppError::ExecutionError {
                        tool: "search".to_string(),
                        message: format!("Failed to create search HTTP client: {}", e),
                    })?;
                let limiter =
                    RateLimiter::new(config.rate_limit_per_second, config.rate_limit_per_month);
                Some(Arc::new(SearchClient::new(
                    http,
                    &config.brave_base_url,
                    key.clone(),
                    limiter,
                )))
            }
            None => {
                tracing::warn!("BRAVE_API_KEY is not set, search tools disabled");
                None
            }
        };

        let mut registry = ToolRegistry::new();
        if let Some(client) = &search {
            registry.register(
                WebSearchTool::descriptor(),
                Arc::new(WebSearchTool::new(Arc::clone(client))),
            )?;
            registry.register(
                LocalSearchTool::descriptor(),
                Arc::new(LocalSearchTool::new(Arc::clone(client))),
            )?;
        }
        registry.register(
            FetchTool::descriptor(&fetch),
            Arc::new(FetchTool::new(Arc::clone(&fetch))),
        )?;
        registry.register(
            MemoryTool::descriptor(),
            Arc::new(MemoryTool::new(Arc::clone(&memory))),
        )?;

        tracing::info!(tools = registry.len(), "Tool registry initialized");

        let registry = Arc::new(registry);
        let state = Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            search,
            fetch,
            memory,
            ready: AtomicBool::new(false),
            config: Arc::new(config),
        };

        // Mark as ready once every tool is wired up
        state.ready.store(true, Ordering::SeqCst);

        Ok(state)
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Release pooled outbound resources.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.fetch.shutdown();
    }
}
