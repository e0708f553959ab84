//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Capping simultaneous requests overall and per host
//! - Enforcing the maximum body size while streaming
//! - Classifying failures into error-log kinds
//! - Optionally caching fetched HTML under the cache directory

use crate::config::{Config, FetcherConfig, UserAgentConfig};
use crate::state::ErrorKind;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, Response};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Semaphore;

/// A successfully fetched HTML document
#[derive(Debug, Clone)]
pub struct Document {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value
    pub content_type: String,
    /// Decoded body
    pub body: String,
}

/// Classified fetch failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("not HTML: {0}")]
    NonHtml(String),

    #[error("empty body")]
    Empty,

    #[error("body larger than {0} bytes")]
    TooLarge(usize),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Error-log kind for this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Status(status) => ErrorKind::HttpStatus(*status),
            Self::NonHtml(_) => ErrorKind::NonHtml,
            Self::Empty => ErrorKind::Empty,
            Self::TooLarge(_) | Self::Other(_) => ErrorKind::Error,
        }
    }

    /// Transport failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body() || lost_connection(&e) {
            Self::Connection(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Looks for an I/O error in the source chain meaning the peer went away
fn lost_connection(e: &reqwest::Error) -> bool {
    use std::error::Error as _;
    use std::io::ErrorKind::{BrokenPipe, ConnectionAborted, ConnectionReset, UnexpectedEof};

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

/// Fetch capability consumed by workers and the sitemap resolver
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches an HTML document
    ///
    /// Succeeds only for a 2xx response with an HTML content type and a
    /// non-empty body.
    async fn fetch_document(&self, url: &str) -> Result<Document, FetchError>;

    /// Fetches raw bytes of any content type (robots.txt, sitemaps)
    ///
    /// Succeeds for any 2xx response.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `fetcher` - Timeouts for every request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use driftnet::config::{FetcherConfig, UserAgentConfig};
/// use driftnet::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "Driftnet".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetcher.request_timeout())
        .connect_timeout(fetcher.connect_timeout())
        .redirect(Policy::limited(10))
        .pool_max_idle_per_host(fetcher.max_connections_per_host)
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`]
///
/// One client is shared by every worker. A global semaphore caps the number
/// of simultaneous requests and a per-host semaphore caps requests to one
/// host, beneath the admission rate enforced by the frontier.
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
    connections: Arc<Semaphore>,
    per_host_limit: usize,
    /// One entry per host ever contacted; never evicted, like frontier domains
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
    cache_dir: Option<PathBuf>,
}

impl HttpFetcher {
    /// Creates a fetcher from the crawl configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, &config.fetcher)?;
        let cache_dir = config
            .governor
            .cache_pages
            .then(|| config.governor.cache_dir.clone());

        Ok(Self {
            client,
            max_body_bytes: config.fetcher.max_body_bytes,
            connections: Arc::new(Semaphore::new(config.fetcher.max_connections.max(1))),
            per_host_limit: config.fetcher.max_connections_per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
            cache_dir,
        })
    }

    fn host_semaphore(&self, url: &str) -> Arc<Semaphore> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_default();

        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone()
    }

    /// Sends a GET while holding both connection permits, then reads the body
    async fn get(&self, url: &str) -> Result<(Response, Vec<u8>), FetchError> {
        let _global = self
            .connections
            .acquire()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;
        let _host = self
            .host_semaphore(url)
            .acquire_owned()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;

        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = read_limited(&mut response, self.max_body_bytes).await?;
        Ok((response, body))
    }

    async fn write_cache(&self, dir: &Path, url: &str, body: &str) {
        let name = hex::encode(Sha256::digest(url.as_bytes()));
        let path = dir.join(format!("{}.html", name));

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::debug!("Failed to create cache dir {}: {}", dir.display(), e);
            return;
        }
        if let Err(e) = tokio::fs::write(&path, body).await {
            tracing::debug!("Failed to cache {}: {}", url, e);
        }
    }
}

/// Reads a response body, failing once it grows past `limit` bytes
async fn read_limited(response: &mut Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::TooLarge(limit));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> Result<Document, FetchError> {
        let (response, body) = self.get(url).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Err(FetchError::NonHtml(content_type));
        }

        let body = String::from_utf8_lossy(&body).into_owned();
        if body.trim().is_empty() {
            return Err(FetchError::Empty);
        }

        if let Some(dir) = &self.cache_dir {
            self.write_cache(dir, url, &body).await;
        }

        Ok(Document {
            url: response.url().to_string(),
            status: response.status().as_u16(),
            content_type,
            body,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (_, body) = self.get(url).await?;
        Ok(body)
    }
}
