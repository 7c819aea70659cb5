//! Alert thresholds and their evaluation against domain telemetry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::SettingsMap;
use crate::parser::float_setting;

use super::telemetry::DomainTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Effective per-domain thresholds. A metric strictly above its threshold
/// raises an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub max_failure_rate: f64,
    pub max_retry_queue: i64,
    pub max_compliance_rejections: i64,
    pub max_parser_fallback_rate: f64,
    pub max_parse_failure_rate: f64,
    pub max_avg_attempt_count: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.35,
            max_retry_queue: 10,
            max_compliance_rejections: 5,
            max_parser_fallback_rate: 0.6,
            max_parse_failure_rate: 0.3,
            max_avg_attempt_count: 2.0,
        }
    }
}

fn int_setting(settings: &SettingsMap, key: &str, default: i64) -> i64 {
    match settings.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

impl AlertThresholds {
    /// Policy `alert_settings` over the global defaults. Values that do not
    /// parse fall back to the default.
    pub fn from_settings(settings: &SettingsMap) -> Self {
        let d = Self::default();
        Self {
            max_failure_rate: float_setting(settings, "max_failure_rate", d.max_failure_rate),
            max_retry_queue: int_setting(settings, "max_retry_queue", d.max_retry_queue),
            max_compliance_rejections: int_setting(
                settings,
                "max_compliance_rejections",
                d.max_compliance_rejections,
            ),
            max_parser_fallback_rate: float_setting(
                settings,
                "max_parser_fallback_rate",
                d.max_parser_fallback_rate,
            ),
            max_parse_failure_rate: float_setting(
                settings,
                "max_parse_failure_rate",
                d.max_parse_failure_rate,
            ),
            max_avg_attempt_count: float_setting(
                settings,
                "max_avg_attempt_count",
                d.max_avg_attempt_count,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub domain: String,
    pub metric: &'static str,
    pub actual: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: &'static str,
}

/// Every breached threshold for one domain, not only the worst.
pub fn evaluate_alerts(metric: &DomainTelemetry) -> Vec<Alert> {
    let t = &metric.alert_thresholds;
    let checks: [(&'static str, f64, f64, Severity, &'static str); 6] = [
        (
            "failure_rate",
            metric.failure_rate,
            t.max_failure_rate,
            Severity::Critical,
            "Harvest failures exceed configured threshold.",
        ),
        (
            "retryable",
            metric.retryable as f64,
            t.max_retry_queue as f64,
            Severity::Warning,
            "Retry queue size exceeds configured threshold.",
        ),
        (
            "compliance_rejections",
            metric.compliance_rejections as f64,
            t.max_compliance_rejections as f64,
            Severity::Warning,
            "Compliance rejections exceed configured threshold.",
        ),
        (
            "parser_fallback_rate",
            metric.parser_fallback_rate,
            t.max_parser_fallback_rate,
            Severity::Warning,
            "Fallback parser usage exceeds configured threshold.",
        ),
        (
            "parse_failure_rate",
            metric.parse_failure_rate,
            t.max_parse_failure_rate,
            Severity::Warning,
            "Parse failures exceed configured threshold.",
        ),
        (
            "avg_attempt_count",
            metric.avg_attempt_count,
            t.max_avg_attempt_count,
            Severity::Warning,
            "Average attempt count exceeds configured threshold.",
        ),
    ];

    checks
        .into_iter()
        .filter(|(_, actual, threshold, _, _)| actual > threshold)
        .map(|(name, actual, threshold, severity, message)| Alert {
            domain: metric.domain.clone(),
            metric: name,
            actual,
            threshold,
            severity,
            message,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thresholds_from_settings() {
        let settings = json!({
            "max_failure_rate": "0.5",
            "max_retry_queue": 4.0,
            "max_avg_attempt_count": "x"
        })
        .as_object()
        .cloned()
        .unwrap();
        let t = AlertThresholds::from_settings(&settings);
        assert_eq!(t.max_failure_rate, 0.5);
        assert_eq!(t.max_retry_queue, 4);
        assert_eq!(t.max_avg_attempt_count, 2.0);
        assert_eq!(t.max_compliance_rejections, 5);
    }

    #[test]
    fn test_all_breaches_reported_strictly() {
        let mut metric = DomainTelemetry::new("food.com");
        metric.failure_rate = 0.5;
        metric.retryable = 10;
        metric.compliance_rejections = 6;
        metric.parse_failure_rate = 0.31;
        let alerts = evaluate_alerts(&metric);
        let names: Vec<&str> = alerts.iter().map(|a| a.metric).collect();
        assert_eq!(names, vec!["failure_rate", "compliance_rejections", "parse_failure_rate"]);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].severity, Severity::Warning);
        assert_eq!(alerts[0].domain, "food.com");
    }
}
