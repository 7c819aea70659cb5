//! reqwest-backed fetcher with a mandatory timeout and per-domain throttling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::Client;
use tracing::debug;

use crate::config::Settings;
use crate::rate_limit::DomainThrottle;

use super::{parse_retry_after, FetchError, FetchedPage, PageFetcher};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP client shared by the runner and the crawl.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    throttle: Arc<DomainThrottle>,
}

impl HttpClient {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        throttle: Arc<DomainThrottle>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, throttle })
    }

    pub fn from_settings(
        settings: &Settings,
        throttle: Arc<DomainThrottle>,
    ) -> Result<Self, FetchError> {
        Self::new(
            &settings.user_agent,
            Duration::from_secs(settings.request_timeout.max(1)),
            throttle,
        )
    }

    pub fn throttle(&self) -> &Arc<DomainThrottle> {
        &self.throttle
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let permit = self.throttle.acquire(url).await?;

        let start = Instant::now();
        let response = match self.client.get(url).header(ACCEPT, ACCEPT_HTML).send().await {
            Ok(response) => response,
            Err(e) => {
                if !e.is_timeout() {
                    self.throttle.report_server_error(permit.domain()).await;
                }
                return Err(e.into());
            }
        };
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let mut retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        self.throttle
            .report_status(permit.domain(), status, retry_after)
            .await;
        if matches!(status, 429 | 503) && retry_after.is_none() {
            // No hint from the server: wait out our own backoff.
            retry_after = self.throttle.current_delay(permit.domain()).await;
        }

        let body = response.text().await?;
        debug!(
            "GET {} -> {} ({} bytes in {:?})",
            url,
            status,
            body.len(),
            start.elapsed()
        );
        drop(permit);

        Ok(FetchedPage {
            url: final_url,
            status,
            body,
            retry_after,
        })
    }
}
