// Fetcher
// HTTP(S) download of prebuilt firmware images

use std::time::Duration;

use reqwest::Client as HttpClient;
use thiserror::Error;
use tracing::debug;

use crate::executor::{cancelled, CancelSignal};

/// Errors that can occur while downloading
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {0} returned an empty body")]
    EmptyBody(String),

    #[error("Download of {0} was cancelled")]
    Cancelled(String),
}

/// Downloads a resource in full
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancelSignal) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: HttpClient,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("testbed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cancel: &CancelSignal) -> Result<Vec<u8>, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                url
            )));
        }

        debug!(%url, "downloading");

        let mut cancel = cancel.clone();
        if *cancel.borrow() {
            return Err(FetchError::Cancelled(url.to_string()));
        }
        tokio::select! {
            result = self.download(url) => {
                let body = result?;
                debug!(%url, bytes = body.len(), "download complete");
                Ok(body)
            }
            _ = cancelled(&mut cancel) => Err(FetchError::Cancelled(url.to_string())),
        }
    }
}
