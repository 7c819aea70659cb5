//! Caller-facing limits per route class.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::clock::Clock;

const WINDOW_SECONDS: i64 = 60;

/// Windows kept before expired ones are swept out.
const MAX_TRACKED_WINDOWS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteClass {
    Ingest,
    SingleHarvest,
    AutoHarvest,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::SingleHarvest => "single-harvest",
            Self::AutoHarvest => "auto-harvest",
        }
    }
}

/// Requests per minute for each route class. Zero disables the limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimits {
    pub ingest_per_minute: u32,
    pub harvest_per_minute: u32,
    pub auto_harvest_per_minute: u32,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            ingest_per_minute: 20,
            harvest_per_minute: 10,
            auto_harvest_per_minute: 180,
        }
    }
}

impl RouteLimits {
    pub fn limit_for(&self, class: RouteClass) -> u32 {
        match class {
            RouteClass::Ingest => self.ingest_per_minute,
            RouteClass::SingleHarvest => self.harvest_per_minute,
            RouteClass::AutoHarvest => self.auto_harvest_per_minute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Admit,
    Reject { retry_after_seconds: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

impl Window {
    fn ends(&self) -> DateTime<Utc> {
        self.started + Duration::seconds(WINDOW_SECONDS)
    }
}

/// Fixed one-minute windows keyed by caller and route class.
pub struct RouteLimiter {
    limits: RouteLimits,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<(String, RouteClass), Window>>,
}

impl RouteLimiter {
    pub fn new(limits: RouteLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &RouteLimits {
        &self.limits
    }

    /// Count one request from `caller` against `class`.
    pub fn check(&self, caller: &str, class: RouteClass) -> RouteDecision {
        let limit = self.limits.limit_for(class);
        if limit == 0 {
            return RouteDecision::Admit;
        }
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if windows.len() > MAX_TRACKED_WINDOWS {
            windows.retain(|_, window| window.ends() > now);
        }

        let window = windows
            .entry((caller.to_string(), class))
            .or_insert(Window { started: now, count: 0 });
        if window.ends() <= now {
            *window = Window { started: now, count: 0 };
        }
        if window.count >= limit {
            let remaining = (window.ends() - now).num_milliseconds();
            let retry_after_seconds = ((remaining + 999) / 1000).max(1) as u64;
            debug!(
                "Rejecting {} on {} ({} per minute), retry after {}s",
                caller,
                class.as_str(),
                limit,
                retry_after_seconds
            );
            return RouteDecision::Reject { retry_after_seconds };
        }
        window.count += 1;
        RouteDecision::Admit
    }
}

/// Stable rate-limit key for a request.
///
/// A matching internal token wins, then a hashed bearer token, then the
/// peer address.
pub fn caller_identity(
    internal_header: Option<&str>,
    internal_token: Option<&str>,
    authorization: Option<&str>,
    peer: Option<&str>,
) -> String {
    if let (Some(given), Some(expected)) = (internal_header, internal_token) {
        if !given.is_empty() && given == expected {
            return "internal:trusted".to_string();
        }
    }
    if let Some(header) = authorization {
        let header = header.trim();
        let is_bearer = header
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));
        if is_bearer {
            let token = header[7..].trim();
            if !token.is_empty() {
                let digest = hex::encode(Sha256::digest(token.as_bytes()));
                return format!("token:{}", &digest[..16]);
            }
        }
    }
    match peer {
        Some(peer) if !peer.is_empty() => peer.to_string(),
        _ => "anonymous".to_string(),
    }
}
