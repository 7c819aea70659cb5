//! Page fetching.
//!
//! Everything that talks to publishers goes through [`PageFetcher`], so the
//! runner and the crawl can be driven by [`MemoryFetcher`] in tests.

mod client;
mod memory;
mod retry_after;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::FetchFailure;
use crate::rate_limit::RateLimitError;

pub use client::HttpClient;
pub use memory::MemoryFetcher;
pub use retry_after::{hint_seconds, parse_retry_after};

/// Deferral for a 429/503 that came without any hint.
pub const DEFAULT_RATE_LIMIT_HINT: Duration = Duration::from_secs(30);

/// Response body plus the URL it was finally served from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error(transparent)]
    Throttled(#[from] RateLimitError),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl FetchError {
    /// Failure class for telemetry. `None` for throttling, which is not a
    /// fetch failure.
    pub fn classify(&self) -> Option<FetchFailure> {
        match self {
            Self::Timeout(_) => Some(FetchFailure::Timeout),
            Self::Connect(_) => Some(FetchFailure::ConnectError),
            Self::Network(_) => Some(FetchFailure::NetworkError),
            Self::Status { status, .. } => Some(FetchFailure::from_status(*status)),
            Self::InvalidUrl(_) => Some(FetchFailure::HttpError),
            Self::Throttled(RateLimitError::InvalidUrl(_)) => Some(FetchFailure::HttpError),
            Self::Throttled(_) => None,
        }
    }

    /// "Try later" hint: a 429/503 (its `Retry-After`, or
    /// [`DEFAULT_RATE_LIMIT_HINT`] without one), or a local throttle
    /// rejection.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Status {
                status: 429 | 503,
                retry_after,
            } => Some(hint_seconds(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_HINT))),
            Self::Throttled(e) => e.retry_after_seconds(),
            _ => None,
        }
    }

    /// `fetch_failed (<class>): <message>`
    pub fn job_error(&self) -> String {
        let class = self.classify().unwrap_or(FetchFailure::Unknown);
        format!("fetch_failed ({}): {}", class, self)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url`, returning whatever status the server answered with.
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// GET `url`, treating any non-2xx status as an error.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let page = self.get(url).await?;
        if !page.is_success() {
            return Err(FetchError::Status {
                status: page.status,
                retry_after: page.retry_after,
            });
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            FetchError::Timeout("t".into()).classify(),
            Some(FetchFailure::Timeout)
        );
        let not_found = FetchError::Status {
            status: 404,
            retry_after: None,
        };
        assert_eq!(not_found.classify(), Some(FetchFailure::Status(404)));
        assert_eq!(not_found.job_error(), "fetch_failed (http-404): HTTP 404");
        let bad_gateway = FetchError::Status {
            status: 502,
            retry_after: None,
        };
        assert_eq!(bad_gateway.classify(), Some(FetchFailure::ServerError));
        let backoff = FetchError::Throttled(RateLimitError::DomainBackoff {
            domain: "food.com".into(),
            retry_after_seconds: 9,
        });
        assert_eq!(backoff.classify(), None);
        assert_eq!(backoff.retry_after_seconds(), Some(9));
    }

    #[test]
    fn test_retry_after_only_for_throttle_statuses() {
        let limited = FetchError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(limited.retry_after_seconds(), Some(4));
        let no_hint = FetchError::Status {
            status: 429,
            retry_after: None,
        };
        assert_eq!(no_hint.retry_after_seconds(), Some(30));
        let server = FetchError::Status {
            status: 500,
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(server.retry_after_seconds(), None);
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert_status("https://food.com/missing", 404, "");
        match fetcher.fetch("https://food.com/missing").await {
            Err(FetchError::Status { status: 404, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
        let page = fetcher.get("https://food.com/missing").await.unwrap();
        assert_eq!(page.status, 404);
    }
}
