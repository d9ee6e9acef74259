//! Generic outbound HTTP fetch.
//!
//! Requests go through one pooled client per TLS-verification mode. The
//! clients never follow redirects on their own: hops are walked here so the
//! intermediate URLs can be reported back to the caller.

use crate::config::Config;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
    COOKIE, LOCATION, USER_AGENT,
};
use reqwest::{redirect, Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("toolgate/", env!("CARGO_PKG_VERSION"));

/// Request body: raw text is sent as-is, anything else is serialized to
/// compact JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchBody {
    Text(String),
    Structured(Value),
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<FetchBody>,
    /// Seconds; engine default when absent.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub follow_redirects: Option<bool>,
    #[serde(default)]
    pub verify_ssl: Option<bool>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: None,
            body: None,
            timeout: None,
            follow_redirects: None,
            verify_ssl: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchTiming {
    pub total_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Final URL after redirects.
    pub url: String,
    /// URLs that answered with a redirect, in visitation order.
    pub redirect_chain: Vec<String>,
    pub timing: FetchTiming,
    pub error: Option<String>,
}

/// Engine-wide defaults applied when a request leaves a knob unset.
#[derive(Debug, Clone)]
pub struct FetchDefaults {
    pub timeout_secs: u64,
    pub follow_redirects: bool,
    pub verify_tls: bool,
    pub max_redirects: usize,
}

impl Default for FetchDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            follow_redirects: true,
            verify_tls: true,
            max_redirects: 10,
        }
    }
}

impl From<&Config> for FetchDefaults {
    fn from(config: &Config) -> Self {
        Self {
            timeout_secs: config.fetch_timeout_secs,
            follow_redirects: config.fetch_follow_redirects,
            verify_tls: config.fetch_verify_tls,
            max_redirects: config.fetch_max_redirects,
        }
    }
}

#[derive(Default)]
struct Sessions {
    verified: Option<Client>,
    unverified: Option<Client>,
}

pub struct FetchEngine {
    defaults: FetchDefaults,
    sessions: Mutex<Sessions>,
}

impl FetchEngine {
    pub fn new(defaults: FetchDefaults) -> Self {
        Self {
            defaults,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    pub fn defaults(&self) -> &FetchDefaults {
        &self.defaults
    }

    /// Create the default (TLS-verifying) pooled client. Idempotent.
    pub fn setup(&self) -> Result<()> {
        self.session(true).map(|_| ())
    }

    /// Release pooled clients. A later fetch sets them up again.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.lock();
        let released = sessions.verified.is_some() || sessions.unverified.is_some();
        *sessions = Sessions::default();
        if released {
            tracing::info!("Fetch sessions released");
        }
    }

    pub fn is_active(&self) -> bool {
        let sessions = self.sessions.lock();
        sessions.verified.is_some() || sessions.unverified.is_some()
    }

    fn session(&self, verify_tls: bool) -> Result<Client> {
        let mut sessions = self.sessions.lock();
        let slot = if verify_tls {
            &mut sessions.verified
        } else {
            &mut sessions.unverified
        };

        if let Some(client) = slot {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| AppError::fetch(format!("Failed to create HTTP client: {}", e), 500))?;

        tracing::debug!(verify_tls, "Fetch session created");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Perform a single fetch attempt.
    ///
    /// # Flow
    /// 1. Validate URL and method
    /// 2. Overlay caller headers on the defaults
    /// 3. Normalize the body
    /// 4. Send, walking redirects when enabled, under the request timeout
    /// 5. Assemble the result from the terminal response
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResult> {
        let url = validate_url(&request.url)?;
        let method = parse_method(&request.method)?;
        let mut headers = prepare_headers(request.headers.as_ref())?;
        let body = prepare_body(&method, request.body.as_ref(), &mut headers)?;

        let timeout_secs = request.timeout.unwrap_or(self.defaults.timeout_secs);
        if timeout_secs == 0 {
            return Err(AppError::fetch("Timeout must be at least 1 second", 400));
        }
        let follow_redirects = request
            .follow_redirects
            .unwrap_or(self.defaults.follow_redirects);
        let verify_tls = request.verify_ssl.unwrap_or(self.defaults.verify_tls);

        let client = self.session(verify_tls)?;
        let hops = Hops {
            client: &client,
            follow: follow_redirects,
            max_redirects: self.defaults.max_redirects,
            timeout_secs,
        };

        let start = Instant::now();
        let exchange = async {
            let (response, redirect_chain) = hops.run(url, method, headers, body).await?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let headers = collect_headers(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| transport_error(e, timeout_secs))?;
            Ok::<_, AppError>((status, final_url, headers, body, redirect_chain))
        };

        let (status, final_url, headers, body, redirect_chain) =
            tokio::time::timeout(Duration::from_secs(timeout_secs), exchange)
                .await
                .map_err(|_| timed_out(timeout_secs))??;
        let elapsed = start.elapsed();

        tracing::debug!(
            url = %final_url,
            status,
            redirects = redirect_chain.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Fetch completed"
        );
        metrics::counter!("fetch_requests_total").increment(1);
        metrics::histogram!("fetch_latency_ms").record(elapsed.as_millis() as f64);

        Ok(FetchResult {
            status,
            headers,
            body,
            url: final_url,
            redirect_chain,
            timing: FetchTiming {
                total_seconds: elapsed.as_secs_f64(),
            },
            error: None,
        })
    }
}

struct Hops<'a> {
    client: &'a Client,
    follow: bool,
    max_redirects: usize,
    timeout_secs: u64,
}

impl Hops<'_> {
    async fn run(
        &self,
        mut current: Url,
        mut method: Method,
        mut headers: HeaderMap,
        mut body: Option<String>,
    ) -> Result<(Response, Vec<String>)> {
        let mut chain = Vec::new();

        loop {
            let mut builder = self
                .client
                .request(method.clone(), current.clone())
                .headers(headers.clone());
            if let Some(body) = &body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| transport_error(e, self.timeout_secs))?;

            if !self.follow || !is_redirect(response.status()) {
                return Ok((response, chain));
            }
            let Some(next) = redirect_target(&current, &response) else {
                return Ok((response, chain));
            };
            if chain.len() >= self.max_redirects {
                return Err(AppError::fetch(
                    format!("Too many redirects (limit: {})", self.max_redirects),
                    500,
                ));
            }

            if rewrites_to_get(response.status(), &method) {
                method = Method::GET;
                body = None;
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }
            if next.host_str() != current.host_str() {
                headers.remove(AUTHORIZATION);
                headers.remove(COOKIE);
            }

            chain.push(current.to_string());
            current = next;
        }
    }
}

/// Require an absolute http(s) URL with a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let invalid = || AppError::fetch(format!("Invalid URL: {}", raw), 400);
    let url = Url::parse(raw).map_err(|_| invalid())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    Ok(url)
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_uppercase().as_bytes())
        .map_err(|_| AppError::fetch(format!("Invalid HTTP method: {}", raw), 400))
}

/// Defaults first, caller values win on collision (names compare
/// case-insensitively).
pub fn prepare_headers(custom: Option<&HashMap<String, String>>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

    for (name, value) in custom.into_iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AppError::fetch(format!("Invalid header name: {}", name), 400))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| AppError::fetch(format!("Invalid value for header {}", name), 400))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

fn prepare_body(
    method: &Method,
    body: Option<&FetchBody>,
    headers: &mut HeaderMap,
) -> Result<Option<String>> {
    let Some(body) = body else {
        return Ok(None);
    };

    if *method == Method::HEAD || *method == Method::TRACE {
        return Err(AppError::fetch(
            format!("Request body is not allowed for {} requests", method),
            400,
        ));
    }

    match body {
        FetchBody::Text(text) => Ok(Some(text.clone())),
        FetchBody::Structured(value) => {
            let text = serde_json::to_string(value)
                .map_err(|e| AppError::fetch(format!("Failed to encode body: {}", e), 400))?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Ok(Some(text))
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_target(current: &Url, response: &Response) -> Option<Url> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current
        .join(location)
        .ok()
        .filter(|next| matches!(next.scheme(), "http" | "https"))
}

/// 303 always becomes GET; 301/302 do so for POST, as browsers do.
fn rewrites_to_get(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => *method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => *method == Method::POST,
        _ => false,
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

fn timed_out(timeout_secs: u64) -> AppError {
    AppError::fetch(
        format!("Request timed out after {} seconds", timeout_secs),
        408,
    )
}

fn transport_error(err: reqwest::Error, timeout_secs: u64) -> AppError {
    if err.is_timeout() {
        return timed_out(timeout_secs);
    }
    AppError::fetch(format!("Request failed: {}", err), 500)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine() -> FetchEngine {
        FetchEngine::new(FetchDefaults::default())
    }

    fn status_of(err: AppError) -> u16 {
        match err {
            AppError::FetchError { status_code, .. } => status_code,
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/path").is_ok());
        assert!(validate_url("http://localhost:8080").is_ok());

        for bad in ["not-a-url", "ftp://example.com", "http://", "mailto:a@b.c", ""] {
            let err = validate_url(bad).unwrap_err();
            assert_eq!(status_of(err), 400, "{bad} should be rejected");
        }
    }

    #[test]
    fn test_caller_headers_override_defaults() {
        let mut custom = HashMap::new();
        custom.insert("user-agent".to_string(), "custom/1.0".to_string());
        custom.insert("X-Trace".to_string(), "abc".to_string());

        let headers = prepare_headers(Some(&custom)).unwrap();

        assert_eq!(headers[USER_AGENT], "custom/1.0");
        assert_eq!(headers[ACCEPT], "*/*");
        assert_eq!(headers["x-trace"], "abc");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut custom = HashMap::new();
        custom.insert("bad header".to_string(), "v".to_string());
        assert_eq!(status_of(prepare_headers(Some(&custom)).unwrap_err()), 400);
    }

    #[test]
    fn test_structured_body_is_compact_json() {
        let mut headers = HeaderMap::new();
        let body = FetchBody::Structured(json!({"name": "toolgate", "tags": [1, 2]}));

        let text = prepare_body(&Method::POST, Some(&body), &mut headers)
            .unwrap()
            .unwrap();

        assert_eq!(text, r#"{"name":"toolgate","tags":[1,2]}"#);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_text_body_passes_through() {
        let mut headers = HeaderMap::new();
        let body = FetchBody::Text("a=1&b=2".to_string());
        let text = prepare_body(&Method::PUT, Some(&body), &mut headers).unwrap();
        assert_eq!(text.as_deref(), Some("a=1&b=2"));
        assert!(!headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_body_rejected_for_head() {
        let mut headers = HeaderMap::new();
        let body = FetchBody::Text("x".to_string());
        let err = prepare_body(&Method::HEAD, Some(&body), &mut headers).unwrap_err();
        assert_eq!(status_of(err), 400);
    }

    #[tokio::test]
    async fn test_invalid_url_never_touches_network() {
        let engine = engine();
        let err = engine.fetch(FetchRequest::get("not-a-url")).await.unwrap_err();

        assert_eq!(status_of(err), 400);
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_fetch_sends_normalized_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("accept", "*/*"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"q":"hello"}"#))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-served-by", "mock")
                    .set_body_string("created"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            method: "post".to_string(),
            body: Some(FetchBody::Structured(json!({"q": "hello"}))),
            ..FetchRequest::get(format!("{}/echo", server.uri()))
        };

        let result = engine().fetch(request).await.unwrap();

        assert_eq!(result.status, 201);
        assert_eq!(result.body, "created");
        assert_eq!(result.headers["x-served-by"], "mock");
        assert!(result.redirect_chain.is_empty());
        assert!(result.timing.total_seconds >= 0.0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_redirect_chain_in_visitation_order() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/middle"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/middle"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", format!("{}/end", base)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/end"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let result = engine()
            .fetch(FetchRequest::get(format!("{}/start", base)))
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.body, "done");
        assert_eq!(result.url, format!("{}/end", base));
        assert_eq!(
            result.redirect_chain,
            vec![format!("{}/start", base), format!("{}/middle", base)]
        );
    }

    #[tokio::test]
    async fn test_redirects_not_followed_when_disabled() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/end"))
            .mount(&server)
            .await;

        let request = FetchRequest {
            follow_redirects: Some(false),
            ..FetchRequest::get(format!("{}/start", server.uri()))
        };
        let result = engine().fetch(request).await.unwrap();

        assert_eq!(result.status, 302);
        assert_eq!(result.headers["location"], "/end");
        assert!(result.redirect_chain.is_empty());
    }

    #[tokio::test]
    async fn test_see_other_switches_post_to_get() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(303).insert_header("location", "/result"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/result"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            method: "POST".to_string(),
            body: Some(FetchBody::Text("payload".to_string())),
            ..FetchRequest::get(format!("{}/submit", server.uri()))
        };
        let result = engine().fetch(request).await.unwrap();

        assert_eq!(result.body, "ok");
        assert_eq!(result.redirect_chain.len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let engine = FetchEngine::new(FetchDefaults {
            max_redirects: 3,
            ..FetchDefaults::default()
        });
        let err = engine
            .fetch(FetchRequest::get(format!("{}/loop", server.uri())))
            .await
            .unwrap_err();

        assert_eq!(status_of(err), 500);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_408() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let request = FetchRequest {
            timeout: Some(1),
            ..FetchRequest::get(format!("{}/slow", server.uri()))
        };
        match engine().fetch(request).await {
            Err(AppError::FetchError {
                message,
                status_code,
            }) => {
                assert_eq!(status_code, 408);
                assert_eq!(message, "Request timed out after 1 seconds");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_500() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = engine()
            .fetch(FetchRequest::get(format!("http://127.0.0.1:{}/", port)))
            .await
            .unwrap_err();

        assert_eq!(status_of(err), 500);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let engine = engine();
        assert!(!engine.is_active());

        engine.setup().unwrap();
        engine.setup().unwrap();
        assert!(engine.is_active());

        engine.shutdown();
        assert!(!engine.is_active());
    }
}
