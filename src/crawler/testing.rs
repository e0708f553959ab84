//! In-process fetcher used by unit tests

use crate::crawler::fetcher::{Document, FetchError, Fetcher};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum StubResponse {
    Html(String),
    Bytes(Vec<u8>),
    Fail(FetchError),
}

/// Serves scripted responses per URL and counts requests
///
/// Responses queued for a URL are served in order; the last one repeats.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    routes: Mutex<HashMap<String, VecDeque<StubResponse>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, response: StubResponse) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn html(self, url: &str, body: &str) -> Self {
        self.with(url, StubResponse::Html(body.to_string()))
    }

    pub fn bytes(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.with(url, StubResponse::Bytes(body.into()))
    }

    pub fn fail(self, url: &str, error: FetchError) -> Self {
        self.with(url, StubResponse::Fail(error))
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn next(&self, url: &str) -> Option<StubResponse> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch_document(&self, url: &str) -> Result<Document, FetchError> {
        match self.next(url) {
            Some(StubResponse::Html(body)) => Ok(Document {
                url: url.to_string(),
                status: 200,
                content_type: "text/html".to_string(),
                body,
            }),
            Some(StubResponse::Bytes(_)) => {
                Err(FetchError::NonHtml("application/octet-stream".to_string()))
            }
            Some(StubResponse::Fail(e)) => Err(e),
            None => Err(FetchError::Status(404)),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match self.next(url) {
            Some(StubResponse::Html(body)) => Ok(body.into_bytes()),
            Some(StubResponse::Bytes(bytes)) => Ok(bytes),
            Some(StubResponse::Fail(e)) => Err(e),
            None => Err(FetchError::Status(404)),
        }
    }
}
