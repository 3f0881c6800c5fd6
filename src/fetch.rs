//! Remote fetch collaborator.
//!
//! Attachment resolution is the only place the engine touches the network.
//! The trait keeps tests hermetic; [`HttpFetcher`] is the production
//! implementation over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while retrieving a remote file.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// A fetched remote file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Retrieves remote files for attachment resolution.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError>;
}

/// HTTP fetcher with a fixed request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError> {
        log::debug!("fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        log::debug!("fetched {} ({} bytes)", url, bytes.len());
        Ok(FetchedFile {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
