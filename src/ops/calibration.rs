//! Alert threshold calibration from observed telemetry.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{HarvestError, Result};
use crate::models::{SettingsMap, SourcePolicy};

use super::telemetry::{round_to, DomainTelemetry, TelemetryReport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOptions {
    #[serde(default)]
    pub apply: bool,
    #[serde(default = "default_min_jobs")]
    pub min_jobs: u64,
    #[serde(default = "default_buffer_multiplier")]
    pub buffer_multiplier: f64,
}

fn default_min_jobs() -> u64 {
    20
}

fn default_buffer_multiplier() -> f64 {
    1.25
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            apply: false,
            min_jobs: default_min_jobs(),
            buffer_multiplier: default_buffer_multiplier(),
        }
    }
}

impl CalibrationOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5000).contains(&self.min_jobs) {
            return Err(HarvestError::Validation("min_jobs must be between 1 and 5000".to_string()));
        }
        if !(1.0..=3.0).contains(&self.buffer_multiplier) {
            return Err(HarvestError::Validation(
                "buffer_multiplier must be between 1.0 and 3.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalibrationStatus {
    InsufficientData,
    Recommended,
    Calibrated,
}

impl CalibrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient-data",
            Self::Recommended => "recommended",
            Self::Calibrated => "calibrated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedMetrics {
    pub failure_rate: f64,
    pub retryable_jobs: u64,
    pub compliance_rejections: u64,
    pub parser_fallback_rate: f64,
    pub parse_failure_rate: f64,
    pub avg_attempt_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationEntry {
    pub domain: String,
    #[serde(skip)]
    pub policy_id: String,
    pub status: CalibrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub min_jobs_required: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_jobs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<ObservedMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_alert_settings: Option<SettingsMap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub generated_at: DateTime<Utc>,
    pub apply: bool,
    pub min_jobs: u64,
    pub buffer_multiplier: f64,
    pub updated_domains: Vec<String>,
    pub recommendations: Vec<CalibrationEntry>,
}

fn clamp_round(value: f64, floor: f64, cap: f64, places: i32) -> f64 {
    round_to(value.clamp(floor, cap), places)
}

/// Recommended thresholds for one domain: observed value times the buffer
/// plus a margin, within fixed floors and caps.
pub fn recommend_thresholds(
    metric: &DomainTelemetry,
    buffer: f64,
    now: DateTime<Utc>,
) -> SettingsMap {
    let retry_queue = ((metric.retryable as f64 * buffer) + 1.0).round().max(3.0) as i64;
    let compliance = ((metric.compliance_rejections as f64 * buffer) + 1.0).round().max(1.0) as i64;
    let fallback_rate = clamp_round(metric.parser_fallback_rate * buffer + 0.05, 0.25, 0.95, 4);
    let parse_failure_rate = clamp_round(metric.parse_failure_rate * buffer + 0.04, 0.15, 0.9, 4);
    let value = json!({
        "max_failure_rate": clamp_round(metric.failure_rate * buffer + 0.02, 0.08, 0.85, 4),
        "max_retry_queue": retry_queue,
        "max_compliance_rejections": compliance,
        "max_parser_fallback_rate": fallback_rate,
        "max_parse_failure_rate": parse_failure_rate,
        "max_avg_attempt_count": clamp_round(metric.avg_attempt_count * buffer + 0.2, 1.2, 5.0, 3),
        "calibrated_from_jobs": metric.total_jobs,
        "calibrated_at": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "calibration_buffer_multiplier": buffer,
    });
    match value {
        Value::Object(map) => map,
        _ => SettingsMap::new(),
    }
}

/// One entry per policy, sorted by domain. Domains below `min_jobs` are
/// reported as insufficient data and get no numbers.
pub fn plan_calibration(
    telemetry: &TelemetryReport,
    policies: &[SourcePolicy],
    options: &CalibrationOptions,
    now: DateTime<Utc>,
) -> CalibrationReport {
    let mut policies: Vec<&SourcePolicy> = policies.iter().collect();
    policies.sort_by(|a, b| a.domain.cmp(&b.domain));

    let recommendations = policies
        .into_iter()
        .map(|policy| {
            let insufficient = |reason: String| CalibrationEntry {
                domain: policy.domain.clone(),
                policy_id: policy.id.clone(),
                status: CalibrationStatus::InsufficientData,
                reason: Some(reason),
                min_jobs_required: options.min_jobs,
                total_jobs: None,
                observed: None,
                recommended_alert_settings: None,
            };
            let Some(metric) = telemetry.domain(&policy.domain) else {
                return insufficient("no_telemetry".to_string());
            };
            if metric.total_jobs < options.min_jobs {
                return insufficient(format!("insufficient_jobs:{}", metric.total_jobs));
            }
            CalibrationEntry {
                domain: policy.domain.clone(),
                policy_id: policy.id.clone(),
                status: if options.apply {
                    CalibrationStatus::Calibrated
                } else {
                    CalibrationStatus::Recommended
                },
                reason: None,
                min_jobs_required: options.min_jobs,
                total_jobs: Some(metric.total_jobs),
                observed: Some(ObservedMetrics {
                    failure_rate: metric.failure_rate,
                    retryable_jobs: metric.retryable,
                    compliance_rejections: metric.compliance_rejections,
                    parser_fallback_rate: metric.parser_fallback_rate,
                    parse_failure_rate: metric.parse_failure_rate,
                    avg_attempt_count: metric.avg_attempt_count,
                }),
                recommended_alert_settings: Some(recommend_thresholds(
                    metric,
                    options.buffer_multiplier,
                    now,
                )),
            }
        })
        .collect();

    CalibrationReport {
        generated_at: now,
        apply: options.apply,
        min_jobs: options.min_jobs,
        buffer_multiplier: options.buffer_multiplier,
        updated_domains: Vec::new(),
        recommendations,
    }
}
