//! Transport session: the single place that talks HTTP
//!
//! [`Transport`] is the seam between the resilience policy in the executor and
//! the network. [`HttpTransport`] implements it on a pooled `reqwest` client
//! with optional SOCKS/HTTP proxying. Pooled connections are released when the
//! last handle to the transport is dropped.

use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::{ConfigError, TransportError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Desktop browser user agents; one is picked per session when none is given
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
];

const SUPPORTED_PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// What the payload of a request is expected to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
}

impl ContentKind {
    pub fn accept_header(self) -> &'static str {
        match self {
            Self::Html => "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            Self::Json => "application/json",
        }
    }
}

/// A single GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub accept: ContentKind,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, accept: ContentKind) -> Self {
        Self {
            url: url.into(),
            accept,
        }
    }
}

/// Raw response as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes raw HTTP requests
///
/// Implementations must report network failures as [`TransportError`] and
/// hand back every HTTP response, including error statuses; status policy is
/// the executor's job.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Settings for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Proxy candidates; one is picked per session, empty means direct
    pub proxies: Vec<String>,
    pub timeout: Duration,
    /// Candidates for the User-Agent header; empty means the built-in pool
    pub user_agents: Vec<String>,
    pub max_connections: usize,
    pub headers: Vec<(String, String)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            user_agents: Vec::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            headers: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(0));
        }
        for proxy in &self.proxies {
            validate_proxy_url(proxy)?;
        }
        Ok(())
    }

    /// Pick the User-Agent for this session
    pub fn resolve_user_agent(&self) -> String {
        let mut rng = rand::rng();
        if let Some(agent) = self.user_agents.choose(&mut rng) {
            return agent.clone();
        }
        DEFAULT_USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(DEFAULT_USER_AGENTS[0])
            .to_string()
    }

    /// Pick the proxy for this session, `None` to connect directly
    pub fn resolve_proxy(&self) -> Option<String> {
        self.proxies.choose(&mut rand::rng()).cloned()
    }
}

fn validate_proxy_url(proxy: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidProxy {
        url: proxy.to_string(),
        reason,
    };
    let parsed = url::Url::parse(proxy).map_err(|e| invalid(e.to_string()))?;
    if !SUPPORTED_PROXY_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// `reqwest`-backed transport with pooling, proxying and default headers
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: String,
    proxy: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let user_agent = config.resolve_user_agent();
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let invalid = || ConfigError::InvalidHeader { name: name.clone() };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_connections);

        let proxy = config.resolve_proxy();
        if let Some(proxy_url) = &proxy {
            debug!(proxy = %proxy_url, "routing session through proxy");
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ConfigError::InvalidProxy {
                url: proxy_url.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Http(e.to_string()))?;

        Ok(Self {
            client,
            user_agent,
            proxy,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Proxy chosen for this session
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(url = %request.url, "sending request");
        let response = self
            .client
            .get(&request.url)
            .header(reqwest::header::ACCEPT, request.accept.accept_header())
            .send()
            .await?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            url,
            status,
            headers,
            body,
        })
    }
}
