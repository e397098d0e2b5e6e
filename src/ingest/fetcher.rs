//! Snapshot fetchers
//!
//! HTTP client for the remote snapshot archive, behind a trait so the
//! download pass can be driven by other sources (or instrumented in tests).

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Retrieves the raw payload behind a locator
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch the complete body. Only returns once the whole payload is in memory.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Remote failures. Both are soft: logged, counted and left for a future run.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The archive answered with an error status; expected for gaps in the data
    #[error("HTTP {status}: likely gap in remote data")]
    RemoteGap { status: u16 },

    /// Connection, DNS, timeout or body read failure
    #[error("Request failed: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_gap(&self) -> bool {
        matches!(self, FetchError::RemoteGap { .. })
    }
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Time allowed to establish a connection
    pub connect_timeout_secs: u64,
    /// Overall time allowed per request, including the body (bodies are large)
    pub request_timeout_secs: u64,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 90,
            request_timeout_secs: 6000,
            max_idle_per_host: 4,
        }
    }
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SnapshotFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::RemoteGap {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        return FetchError::RemoteGap {
            status: status.as_u16(),
        };
    }

    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else {
        "request"
    };
    FetchError::Transport(format!("{}: {}", kind, err))
}
