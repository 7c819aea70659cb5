//! Rate limiting: caller-facing route limits and per-domain fetch throttling.
//!
//! The two are independent. Route limits protect the API from callers;
//! the domain throttle protects publishers from us.

mod clock;
mod route;
mod throttle;

use thiserror::Error;

use crate::error::HarvestError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use route::{caller_identity, RouteClass, RouteDecision, RouteLimiter, RouteLimits};
pub use throttle::{DomainStats, DomainThrottle, ThrottleConfig, ThrottlePermit};

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Too many {route} requests, retry after {retry_after_seconds}s")]
    RouteLimited {
        route: &'static str,
        retry_after_seconds: u64,
    },
    #[error("{domain} is backing off, retry after {retry_after_seconds}s")]
    DomainBackoff {
        domain: String,
        retry_after_seconds: u64,
    },
    #[error("No host in URL: {0}")]
    InvalidUrl(String),
    #[error("Throttle closed")]
    Closed,
}

impl RateLimitError {
    /// Seconds the caller should wait, when this is a "try later" signal.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RouteLimited {
                retry_after_seconds,
                ..
            }
            | Self::DomainBackoff {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl From<RateLimitError> for HarvestError {
    fn from(e: RateLimitError) -> Self {
        match e.retry_after_seconds() {
            Some(retry_after_seconds) => HarvestError::Throttled {
                retry_after_seconds,
            },
            None => match e {
                RateLimitError::InvalidUrl(url) => {
                    HarvestError::Validation(format!("No host in URL: {}", url))
                }
                other => HarvestError::Other(other.to_string()),
            },
        }
    }
}

impl RouteLimiter {
    /// [`RouteLimiter::check`] as a `Result` for `?` at the API boundary.
    pub fn admit(&self, caller: &str, class: RouteClass) -> Result<(), RateLimitError> {
        match self.check(caller, class) {
            RouteDecision::Admit => Ok(()),
            RouteDecision::Reject {
                retry_after_seconds,
            } => Err(RateLimitError::RouteLimited {
                route: class.as_str(),
                retry_after_seconds,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_route_rejection_converts_to_throttled() {
        let limits = RouteLimits {
            ingest_per_minute: 1,
            ..Default::default()
        };
        let limiter = RouteLimiter::new(limits, Arc::new(SystemClock));
        assert!(limiter.admit("a", RouteClass::Ingest).is_ok());
        let err = limiter.admit("a", RouteClass::Ingest).unwrap_err();
        assert!(err.retry_after_seconds().unwrap() >= 1);
        assert!(matches!(
            HarvestError::from(err),
            HarvestError::Throttled { .. }
        ));
    }

    #[test]
    fn test_non_hint_errors() {
        assert!(RateLimitError::Closed.retry_after_seconds().is_none());
        assert!(matches!(
            HarvestError::from(RateLimitError::InvalidUrl("x".into())),
            HarvestError::Validation(_)
        ));
    }
}
