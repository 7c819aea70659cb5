//! Adaptive per-destination-domain fetch throttle.
//!
//! Spaces requests to each domain by an adaptive delay and bounds how many
//! fetches may be in flight per domain. Backs off on 429/503, mildly on
//! other 5xx, and gradually recovers after consecutive successes. A
//! `Retry-After` hint blocks the domain outright until it expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::models::normalized_host;

use super::RateLimitError;

/// Successes in a row before the delay starts shrinking.
const RECOVERY_THRESHOLD: u32 = 5;

/// Delay growth on a 5xx that is not a rate limit.
const SERVER_ERROR_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub recovery_multiplier: f64,
    pub max_concurrent_per_domain: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(60_000),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            max_concurrent_per_domain: 2,
        }
    }
}

#[derive(Debug)]
struct DomainState {
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
    blocked_until: Option<Instant>,
    total_requests: u64,
    rate_limit_hits: u64,
    permits: Arc<Semaphore>,
}

impl DomainState {
    fn new(config: &ThrottleConfig) -> Self {
        Self {
            current_delay: config.base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            blocked_until: None,
            total_requests: 0,
            rate_limit_hits: 0,
            permits: Arc::new(Semaphore::new(config.max_concurrent_per_domain.max(1))),
        }
    }

    fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn blocked_for(&self, now: Instant) -> Option<Duration> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    fn grow_delay(&mut self, multiplier: f64, max: Duration) {
        let grown = Duration::from_secs_f64(self.current_delay.as_secs_f64() * multiplier);
        self.current_delay = grown.min(max);
    }
}

/// Snapshot of one domain's throttle state.
#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    pub current_delay_ms: u64,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
    pub available_permits: usize,
}

/// Held for the duration of one fetch. Dropping it frees the domain slot.
#[derive(Debug)]
pub struct ThrottlePermit {
    domain: String,
    _permit: OwnedSemaphorePermit,
}

impl ThrottlePermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

#[derive(Debug)]
pub struct DomainThrottle {
    config: ThrottleConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl Default for DomainThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl DomainThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Wait for a slot and the domain's delay, then mark the request started.
    ///
    /// Fails fast while the domain is blocked by a `Retry-After` hint.
    pub async fn acquire(&self, url: &str) -> Result<ThrottlePermit, RateLimitError> {
        let domain = normalized_host(url);
        if domain.is_empty() {
            return Err(RateLimitError::InvalidUrl(url.to_string()));
        }

        let semaphore = {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(&self.config));
            if let Some(remaining) = state.blocked_for(Instant::now()) {
                return Err(RateLimitError::DomainBackoff {
                    domain,
                    retry_after_seconds: remaining.as_secs_f64().ceil().max(1.0) as u64,
                });
            }
            state.permits.clone()
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| RateLimitError::Closed)?;

        // Another holder may have started a request while we slept.
        loop {
            let wait = {
                let domains = self.domains.read().await;
                domains
                    .get(&domain)
                    .map(DomainState::time_until_ready)
                    .unwrap_or(Duration::ZERO)
            };
            if wait > Duration::ZERO {
                debug!("Throttling {}: waiting {:?}", domain, wait);
                tokio::time::sleep(wait).await;
            }

            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(&self.config));
            if state.time_until_ready() > Duration::ZERO {
                continue;
            }
            state.last_request = Some(Instant::now());
            state.total_requests += 1;
            break;
        }

        Ok(ThrottlePermit {
            domain,
            _permit: permit,
        })
    }

    /// Feed a response status back into the domain's delay.
    pub async fn report_status(&self, domain: &str, status: u16, retry_after: Option<Duration>) {
        match status {
            429 | 503 => self.report_rate_limit(domain, status, retry_after).await,
            500..=599 => self.report_server_error(domain).await,
            200..=399 => self.report_success(domain).await,
            _ => debug!("HTTP {} from {}, delay unchanged", status, domain),
        }
    }

    /// Successful request; may shrink the delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        let Some(state) = domains.get_mut(domain) else {
            return;
        };
        state.consecutive_successes += 1;
        if state.in_backoff && state.consecutive_successes >= RECOVERY_THRESHOLD {
            let reduced = Duration::from_secs_f64(
                state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
            );
            state.current_delay = reduced.max(self.config.min_delay);
            if state.current_delay <= self.config.base_delay {
                state.in_backoff = false;
                state.current_delay = self.config.base_delay;
                info!("Domain {} recovered from backoff", domain);
            } else {
                debug!("Domain {} delay reduced to {:?}", domain, state.current_delay);
            }
            state.consecutive_successes = 0;
        }
    }

    /// 429 or 503. Grows the delay and honours any `Retry-After` hint.
    pub async fn report_rate_limit(
        &self,
        domain: &str,
        status: u16,
        retry_after: Option<Duration>,
    ) {
        let mut domains = self.domains.write().await;
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(&self.config));
        state.rate_limit_hits += 1;
        state.consecutive_successes = 0;
        state.in_backoff = true;
        state.grow_delay(self.config.backoff_multiplier, self.config.max_delay);
        if let Some(hint) = retry_after {
            state.blocked_until = Some(Instant::now() + hint);
        }
        warn!(
            "Rate limited by {} (HTTP {}), backing off to {:?}",
            domain, status, state.current_delay
        );
    }

    /// Other 5xx: the server may be overloaded.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes = 0;
            state.grow_delay(SERVER_ERROR_MULTIPLIER, self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// The domain's current spacing between requests, once it has been seen.
    pub async fn current_delay(&self, domain: &str) -> Option<Duration> {
        let domains = self.domains.read().await;
        domains.get(domain).map(|state| state.current_delay)
    }

    pub async fn stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(domain, state)| {
                (
                    domain.clone(),
                    DomainStats {
                        current_delay_ms: state.current_delay.as_millis() as u64,
                        in_backoff: state.in_backoff,
                        total_requests: state.total_requests,
                        rate_limit_hits: state.rate_limit_hits,
                        available_permits: state.permits.available_permits(),
                    },
                )
            })
            .collect()
    }
}
