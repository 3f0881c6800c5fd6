//! Shared helpers for unit and integration tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::fetch::{FetchError, FetchedFile, RemoteFetcher};

enum StubResponse {
    File(Vec<u8>),
    Status(u16),
}

/// Scripted [`RemoteFetcher`]: serves configured payloads or status
/// failures and counts how often the network was hit.
#[derive(Default)]
pub struct StubFetcher {
    responses: RwLock<HashMap<String, StubResponse>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`.
    pub fn with_file(self, url: &str, bytes: Vec<u8>) -> Self {
        self.responses
            .write()
            .expect("stub fetcher lock poisoned")
            .insert(url.to_string(), StubResponse::File(bytes));
        self
    }

    /// Fail `url` with an HTTP status.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.responses
            .write()
            .expect("stub fetcher lock poisoned")
            .insert(url.to_string(), StubResponse::Status(status));
        self
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemoteFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let responses = self.responses.read().expect("stub fetcher lock poisoned");
        match responses.get(url) {
            Some(StubResponse::File(bytes)) => Ok(FetchedFile {
                bytes: bytes.clone(),
                content_type: None,
            }),
            Some(StubResponse::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
