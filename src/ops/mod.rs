//! Operator tooling: telemetry, alerts, threshold calibration and parser
//! recovery suggestions.

pub mod alerts;
pub mod calibration;
pub mod recovery;
pub mod telemetry;

pub use alerts::{evaluate_alerts, Alert, AlertThresholds, Severity};
pub use calibration::{
    plan_calibration, recommend_thresholds, CalibrationEntry, CalibrationOptions, CalibrationReport,
    CalibrationStatus,
};
pub use recovery::{suggest_recovery, RecoveryRequest, RecoverySuggestion};
pub use telemetry::{
    aggregate, DomainTelemetry, GlobalTelemetry, RecoveryCandidate, TelemetryReport,
};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{HarvestError, Result};
use crate::models::host_matches_domain;
use crate::repository::{JobRepository, PolicyRepository};

/// Telemetry filter.
#[derive(Debug, Clone, Default)]
pub struct TelemetryQuery {
    pub domain: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Read-mostly views over jobs and policies, plus the two explicit policy
/// writes (calibration apply and recovery apply).
#[derive(Clone)]
pub struct OpsService {
    jobs: JobRepository,
    policies: PolicyRepository,
    max_attempts: i32,
    window: i64,
}

impl OpsService {
    pub fn new(
        jobs: JobRepository,
        policies: PolicyRepository,
        max_attempts: i32,
        window: i64,
    ) -> Self {
        Self {
            jobs,
            policies,
            max_attempts,
            window: window.max(1),
        }
    }

    pub async fn telemetry(&self, query: &TelemetryQuery) -> Result<TelemetryReport> {
        let mut jobs = self.jobs.recent(self.window, query.since).await?;
        if let Some(domain) = query.domain.as_deref().map(|d| d.trim().to_lowercase()) {
            let domain = domain.strip_prefix("www.").unwrap_or(&domain).to_string();
            jobs.retain(|job| host_matches_domain(&job.domain(), &domain));
        }
        let policies = self.policies.list().await?;
        Ok(aggregate(&jobs, &policies, self.max_attempts, Utc::now()))
    }

    pub async fn alerts(&self, query: &TelemetryQuery) -> Result<Vec<Alert>> {
        Ok(self.telemetry(query).await?.alerts)
    }

    /// Preview recommended thresholds, or with `apply` merge them into each
    /// eligible policy's alert settings.
    pub async fn calibrate(&self, options: &CalibrationOptions) -> Result<CalibrationReport> {
        options.validate()?;
        let telemetry = self.telemetry(&TelemetryQuery::default()).await?;
        let policies = self.policies.list().await?;
        let mut report = plan_calibration(&telemetry, &policies, options, Utc::now());
        if !options.apply {
            return Ok(report);
        }

        for entry in &report.recommendations {
            let Some(recommended) = &entry.recommended_alert_settings else {
                continue;
            };
            let Some(policy) = policies.iter().find(|p| p.id == entry.policy_id) else {
                continue;
            };
            let mut settings = policy.alert_settings.clone();
            for (key, value) in recommended {
                settings.insert(key.clone(), value.clone());
            }
            if self.policies.set_alert_settings(&policy.id, &settings).await? {
                report.updated_domains.push(policy.domain.clone());
            }
        }
        info!("Calibrated alert thresholds for {} domains", report.updated_domains.len());
        Ok(report)
    }

    /// Recovery preview for a policy; with `apply` the patch is merged into
    /// its parser settings when there is something to change.
    pub async fn recover(
        &self,
        policy_id: &str,
        request: &RecoveryRequest,
        apply: bool,
    ) -> Result<RecoverySuggestion> {
        let policy = self
            .policies
            .get(policy_id)
            .await?
            .ok_or_else(|| HarvestError::NotFound(format!("Source policy {}", policy_id)))?;
        let mut suggestion = suggest_recovery(&policy, request)?;
        if apply && suggestion.is_applicable() {
            let merged = suggestion.merged_settings(&policy.parser_settings);
            suggestion.applied = self.policies.set_parser_settings(&policy.id, &merged).await?;
            info!(
                "Applied recovery for {} ({}): {}",
                policy.domain,
                suggestion.parse_failure,
                suggestion.changed_keys.join(", ")
            );
        }
        Ok(suggestion)
    }
}
