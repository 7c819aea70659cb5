//! In-memory fetcher serving canned responses.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{FetchError, FetchedPage, PageFetcher};

#[derive(Debug, Clone)]
enum Canned {
    Page(FetchedPage),
    Timeout,
    Refused,
}

/// Serves registered URLs; anything else answers 404.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    responses: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, url: &str, canned: Canned) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), canned);
    }

    /// 200 with `html`.
    pub fn insert(&self, url: &str, html: &str) {
        self.insert_status(url, 200, html);
    }

    pub fn insert_status(&self, url: &str, status: u16, body: &str) {
        self.put(
            url,
            Canned::Page(FetchedPage {
                url: url.to_string(),
                status,
                body: body.to_string(),
                retry_after: None,
            }),
        );
    }

    /// 200 served from `final_url` after a redirect.
    pub fn insert_redirect(&self, url: &str, final_url: &str, html: &str) {
        self.put(
            url,
            Canned::Page(FetchedPage {
                url: final_url.to_string(),
                status: 200,
                body: html.to_string(),
                retry_after: None,
            }),
        );
    }

    /// 429 with `Retry-After: <seconds>`.
    pub fn insert_rate_limited(&self, url: &str, retry_after_seconds: u64) {
        self.put(
            url,
            Canned::Page(FetchedPage {
                url: url.to_string(),
                status: 429,
                body: String::new(),
                retry_after: Some(Duration::from_secs(retry_after_seconds)),
            }),
        );
    }

    pub fn insert_timeout(&self, url: &str) {
        self.put(url, Canned::Timeout);
    }

    pub fn insert_refused(&self, url: &str) {
        self.put(url, Canned::Refused);
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl PageFetcher for MemoryFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        let canned = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned();
        match canned {
            Some(Canned::Page(page)) => Ok(page),
            Some(Canned::Timeout) => Err(FetchError::Timeout(format!("{} timed out", url))),
            Some(Canned::Refused) => Err(FetchError::Connect(format!("{} refused", url))),
            None => Ok(FetchedPage {
                url: url.to_string(),
                status: 404,
                body: String::new(),
                retry_after: None,
            }),
        }
    }
}
