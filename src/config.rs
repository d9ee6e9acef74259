use std::env;
use std::path::PathBuf;

/// Default Brave Search API endpoint.
pub const DEFAULT_BRAVE_BASE_URL: &str = "https://api.search.brave.com/res/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    /// Search provider key. Search tools are only registered when present.
    pub brave_api_key: Option<String>,
    pub brave_base_url: String,
    /// Maximum chargeable search calls per second.
    pub rate_limit_per_second: u32,
    /// Maximum chargeable search calls per calendar month.
    pub rate_limit_per_month: u32,
    /// Fetch timeout used when a request does not specify one.
    pub fetch_timeout_secs: u64,
    pub fetch_follow_redirects: bool,
    pub fetch_verify_tls: bool,
    /// Redirect hops followed before a fetch is abandoned.
    pub fetch_max_redirects: usize,
    /// JSON file backing the memory store.
    pub memory_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            shutdown_timeout_secs: 5,
            brave_api_key: None,
            brave_base_url: DEFAULT_BRAVE_BASE_URL.to_string(),
            rate_limit_per_second: 1,
            rate_limit_per_month: 15_000,
            fetch_timeout_secs: 30,
            fetch_follow_redirects: true,
            fetch_verify_tls: true,
            fetch_max_redirects: 10,
            memory_path: PathBuf::from("./data/memories.json"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Unset variables fall back to [`Config::default`]; set but unparsable
    /// values are reported as errors rather than silently ignored.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port)?,
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT", defaults.shutdown_timeout_secs)?,
            brave_api_key: env::var("BRAVE_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            brave_base_url: env::var("BRAVE_BASE_URL").unwrap_or(defaults.brave_base_url),
            rate_limit_per_second: parse_var(
                "RATE_LIMIT_PER_SECOND",
                defaults.rate_limit_per_second,
            )?,
            rate_limit_per_month: parse_var("RATE_LIMIT_PER_MONTH", defaults.rate_limit_per_month)?,
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT", defaults.fetch_timeout_secs)?,
            fetch_follow_redirects: parse_flag(
                "FETCH_FOLLOW_REDIRECTS",
                defaults.fetch_follow_redirects,
            )?,
            fetch_verify_tls: parse_flag("FETCH_VERIFY_TLS", defaults.fetch_verify_tls)?,
            fetch_max_redirects: parse_var("FETCH_MAX_REDIRECTS", defaults.fetch_max_redirects)?,
            memory_path: env::var("MEMORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.memory_path),
        })
    }

    /// Whether the external search provider is usable.
    pub fn search_enabled(&self) -> bool {
        self.brave_api_key.is_some()
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(anyhow::anyhow!("Invalid value for {}: {}", name, other)),
        },
        Err(_) => Ok(default),
    }
}
