//! Brave Search client.
//!
//! Every chargeable provider call goes through the shared [`RateLimiter`]
//! before any network traffic is generated.

use crate::error::{AppError, Result};
use crate::search::rate_limit::RateLimiter;
use reqwest::Client;
use serde_json::Value;
use url::Url;

/// Provider-side cap on results per query.
pub const MAX_RESULT_COUNT: u64 = 20;

pub struct SearchClient {
    http: Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl SearchClient {
    pub fn new(http: Client, base_url: &str, api_key: String, limiter: RateLimiter) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            limiter,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Web search. Charges one call.
    pub async fn web_search(&self, query: &str, count: u64) -> Result<Value> {
        self.limiter.check_limit()?;
        self.web_search_uncharged(query, count).await
    }

    /// Local (points of interest) search with transparent web fallback.
    ///
    /// The location lookup is charged up front. If it fails or yields no
    /// location ids, the web search that replaces it runs on that same
    /// charge. A successful lookup is followed by a separately charged POI
    /// detail request.
    pub async fn local_search(&self, query: &str, count: u64) -> Result<Value> {
        self.limiter.check_limit()?;

        let location_ids = match self.lookup_locations(query, count).await {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => {
                tracing::info!(query, "No locations found, falling back to web search");
                return self.web_search_uncharged(query, count).await;
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "Location lookup failed, falling back to web search");
                return self.web_search_uncharged(query, count).await;
            }
        };

        self.limiter.check_limit()?;

        let mut url = self.endpoint("local/pois")?;
        {
            let mut pairs = url.query_pairs_mut();
            for id in &location_ids {
                pairs.append_pair("ids", id);
            }
        }

        tracing::debug!(locations = location_ids.len(), "Fetching POI details");
        self.get_json(url).await
    }

    async fn web_search_uncharged(&self, query: &str, count: u64) -> Result<Value> {
        let mut url = self.endpoint("web/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &clamp_count(count).to_string());

        self.get_json(url).await
    }

    async fn lookup_locations(&self, query: &str, count: u64) -> Result<Vec<String>> {
        let mut url = self.endpoint("web/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &clamp_count(count).to_string())
            .append_pair("result_filter", "locations");

        let data = self.get_json(url).await?;
        Ok(location_ids(&data))
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(|e| AppError::UpstreamError {
            status: 502,
            body: format!("Invalid JSON from search provider: {}", e),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base_url, path)).map_err(|e| AppError::UpstreamError {
            status: 502,
            body: format!("Invalid search provider URL: {}", e),
        })
    }
}

fn clamp_count(count: u64) -> u64 {
    count.min(MAX_RESULT_COUNT)
}

/// Pull `locations.results[*].id` out of a location lookup payload.
fn location_ids(data: &Value) -> Vec<String> {
    data.pointer("/locations/results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_str))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A provider call that never produced a response.
fn transport_error(err: reqwest::Error) -> AppError {
    AppError::UpstreamError {
        status: err.status().map(|s| s.as_u16()).unwrap_or(502),
        body: err.to_string(),
    }
}
