//! Retry scheduling as pure functions of job state and time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::JobStatus;

/// Exponential backoff for failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_seconds: i64,
    pub max_seconds: i64,
    pub max_attempts: i32,
    /// A `running` job claimed longer ago than this was interrupted and is
    /// released back to the retry schedule.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: i64,
}

fn default_lease_seconds() -> i64 {
    600
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_seconds: 300,
            max_seconds: 3600,
            max_attempts: 3,
            lease_seconds: default_lease_seconds(),
        }
    }
}

impl RetryPolicy {
    /// Claims made at or before this instant have expired.
    pub fn lease_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.lease_seconds.max(1))
    }
}

/// `min(base * 2^(attempt_count - 1), max)` in seconds. Attempt counts
/// below 1 are treated as 1.
pub fn compute_retry_delay(attempt_count: i32, policy: &RetryPolicy) -> i64 {
    let exponent = (attempt_count.max(1) - 1).min(62) as u32;
    let base = policy.base_seconds.max(0);
    let delay = base.saturating_mul(2i64.saturating_pow(exponent));
    delay.min(policy.max_seconds.max(0))
}

/// When a job that just failed its `attempt_count`-th attempt may run
/// again, or `None` once the retry budget is spent.
pub fn compute_next_retry(
    attempt_count: i32,
    now: DateTime<Utc>,
    policy: &RetryPolicy,
) -> Option<DateTime<Utc>> {
    if attempt_count >= policy.max_attempts {
        return None;
    }
    Some(now + Duration::seconds(compute_retry_delay(attempt_count, policy)))
}

/// Whether a job may be claimed at `now`.
///
/// A job with `next_retry_at` or `deferred_until` strictly in the future is
/// never runnable, whatever its status.
pub fn is_runnable(
    status: JobStatus,
    attempt_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    deferred_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_attempts: i32,
) -> bool {
    if next_retry_at.is_some_and(|at| at > now) || deferred_until.is_some_and(|at| at > now) {
        return false;
    }
    match status {
        JobStatus::Pending | JobStatus::Failed => attempt_count < max_attempts,
        JobStatus::Running | JobStatus::Succeeded => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(compute_retry_delay(1, &policy), 300);
        assert_eq!(compute_retry_delay(2, &policy), 600);
        assert_eq!(compute_retry_delay(3, &policy), 1200);
        assert_eq!(compute_retry_delay(5, &policy), 3600);
        assert_eq!(compute_retry_delay(0, &policy), 300);
        assert_eq!(compute_retry_delay(i32::MAX, &policy), 3600);

        let mut previous = 0;
        for n in 1..40 {
            let delay = compute_retry_delay(n, &policy);
            assert!(delay >= previous);
            assert!(delay <= policy.max_seconds);
            previous = delay;
        }
    }

    #[test]
    fn test_next_retry_only_with_budget() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        assert_eq!(compute_next_retry(1, now, &policy), Some(now + Duration::seconds(300)));
        assert_eq!(compute_next_retry(2, now, &policy), Some(now + Duration::seconds(600)));
        assert_eq!(compute_next_retry(3, now, &policy), None);
    }

    #[test]
    fn test_lease_expiry() {
        let policy = RetryPolicy {
            lease_seconds: 120,
            ..Default::default()
        };
        let now = Utc::now();
        assert_eq!(policy.lease_expiry(now), now - Duration::seconds(120));
    }

    #[test]
    fn test_runnable_predicate() {
        let now = Utc::now();
        let later = Some(now + Duration::seconds(1));
        let earlier = Some(now - Duration::seconds(1));

        assert!(is_runnable(JobStatus::Pending, 0, None, None, now, 3));
        assert!(!is_runnable(JobStatus::Pending, 0, later, None, now, 3));
        assert!(!is_runnable(JobStatus::Pending, 0, None, later, now, 3));
        assert!(is_runnable(JobStatus::Pending, 0, None, earlier, now, 3));

        assert!(is_runnable(JobStatus::Failed, 1, earlier, None, now, 3));
        assert!(is_runnable(JobStatus::Failed, 1, Some(now), None, now, 3));
        assert!(!is_runnable(JobStatus::Failed, 1, later, None, now, 3));
        assert!(!is_runnable(JobStatus::Failed, 3, None, None, now, 3));

        assert!(!is_runnable(JobStatus::Running, 1, None, None, now, 3));
        assert!(!is_runnable(JobStatus::Succeeded, 1, None, None, now, 3));
    }
}
