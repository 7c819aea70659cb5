//! Per-domain telemetry derived from recent job history.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::models::{
    host_matches_domain, FailureClass, HarvestJob, JobStatus, ParseStrategy, SourcePolicy,
};

use super::alerts::{evaluate_alerts, Alert, AlertThresholds};

pub type Counts = BTreeMap<String, u64>;

const LATEST_FAILURES: usize = 8;
const TOP_ENTRIES: usize = 8;
const MAX_HINTS: usize = 5;

static PARSE_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Unable to parse recipe \((?P<class>[a-z0-9-]+)\)").unwrap());
static FETCH_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fetch_failed \((?P<class>[a-z0-9-]+)\)").unwrap());

#[derive(Debug, Clone, Serialize)]
pub struct FailureSample {
    pub job_id: String,
    pub source_url: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub compliance_reasons: Vec<String>,
}

/// A failure class seen under any tag prefix, with where it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryCandidate {
    pub class: String,
    pub parse_failed: u64,
    pub dom_fallback: u64,
    pub recovery: u64,
    pub total: u64,
    pub supported: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainTelemetry {
    pub domain: String,
    pub total_jobs: u64,
    pub pending: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retryable: u64,
    pub compliance_rejections: u64,
    pub avg_attempt_count: f64,
    pub max_attempt_count: i32,
    pub avg_retry_delay_seconds: f64,
    pub failure_rate: f64,
    pub parser_fallback_rate: f64,
    pub parse_failure_rate: f64,
    pub parser_strategies: Counts,
    pub fallback_class_counts: Counts,
    pub recovery_strategy_counts: Counts,
    pub parse_failure_counts: Counts,
    pub failure_reason_counts: Counts,
    pub latest_failures: Vec<FailureSample>,
    pub top_failure_reasons: Vec<(String, u64)>,
    pub top_parse_failure_classes: Vec<(String, u64)>,
    pub recovery_candidates: Vec<RecoveryCandidate>,
    pub triage_hints: Vec<String>,
    pub alert_thresholds: AlertThresholds,
    #[serde(skip)]
    attempt_total: i64,
    #[serde(skip)]
    retry_delay_total: f64,
    #[serde(skip)]
    fallback_successes: u64,
    #[serde(skip)]
    parse_related_failures: u64,
}

impl DomainTelemetry {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            total_jobs: 0,
            pending: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
            retryable: 0,
            compliance_rejections: 0,
            avg_attempt_count: 0.0,
            max_attempt_count: 0,
            avg_retry_delay_seconds: 0.0,
            failure_rate: 0.0,
            parser_fallback_rate: 0.0,
            parse_failure_rate: 0.0,
            parser_strategies: Counts::new(),
            fallback_class_counts: Counts::new(),
            recovery_strategy_counts: Counts::new(),
            parse_failure_counts: Counts::new(),
            failure_reason_counts: Counts::new(),
            latest_failures: Vec::new(),
            top_failure_reasons: Vec::new(),
            top_parse_failure_classes: Vec::new(),
            recovery_candidates: Vec::new(),
            triage_hints: Vec::new(),
            alert_thresholds: AlertThresholds::default(),
            attempt_total: 0,
            retry_delay_total: 0.0,
            fallback_successes: 0,
            parse_related_failures: 0,
        }
    }

    fn observe(&mut self, job: &HarvestJob, max_attempts: i32) {
        self.total_jobs += 1;
        match job.status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
        }
        let failed = job.status == JobStatus::Failed;

        self.attempt_total += i64::from(job.attempt_count);
        self.max_attempt_count = self.max_attempt_count.max(job.attempt_count);
        if failed && job.attempt_count < max_attempts {
            self.retryable += 1;
        }
        if let (Some(last), Some(next)) = (job.last_attempt_at, job.next_retry_at) {
            let delta = (next - last).num_milliseconds() as f64 / 1000.0;
            if delta > 0.0 {
                self.retry_delay_total += delta;
            }
        }

        let reasons = job.compliance_reasons.as_deref().unwrap_or_default();
        if !reasons.is_empty() {
            self.compliance_rejections += 1;
            for reason in reasons {
                let key = format!("compliance:{}", reason);
                bump(&mut self.failure_reason_counts, &key);
                bump(&mut self.parse_failure_counts, &key);
            }
        }

        let strategy_key = job
            .parse_strategy
            .as_ref()
            .map(ToString::to_string)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        bump(&mut self.parser_strategies, &strategy_key);

        match &job.parse_strategy {
            Some(ParseStrategy::DomFallback { class, .. }) => {
                bump(&mut self.fallback_class_counts, class.as_str());
            }
            Some(ParseStrategy::Recovery { class, .. }) => {
                bump(&mut self.recovery_strategy_counts, class.as_str());
            }
            _ => {}
        }
        if job.status == JobStatus::Succeeded
            && job.parse_strategy.as_ref().is_some_and(ParseStrategy::is_fallback)
        {
            self.fallback_successes += 1;
        }

        // Each job contributes one failure class: the recorded strategy when it
        // carries one, else the class embedded in the error text.
        let failure = failure_key(job);
        if let Some(key) = &failure {
            bump(&mut self.parse_failure_counts, key.as_key());
        }

        if failed {
            if failure.as_ref().is_some_and(FailureKey::is_parse_related) {
                self.parse_related_failures += 1;
            }
            if let Some(error) = job.error.as_deref().filter(|e| !e.is_empty()) {
                let prefix: String = error
                    .split(':')
                    .next()
                    .unwrap_or(error)
                    .trim()
                    .chars()
                    .take(120)
                    .collect();
                bump(&mut self.failure_reason_counts, &format!("error:{}", prefix));
            }
            if self.latest_failures.len() < LATEST_FAILURES {
                self.latest_failures.push(FailureSample {
                    job_id: job.id.clone(),
                    source_url: job.source_url.clone(),
                    attempt_count: job.attempt_count,
                    next_retry_at: job.next_retry_at,
                    error: job.error.clone(),
                    compliance_reasons: reasons.to_vec(),
                });
            }
        }
    }

    fn finalize(&mut self, thresholds: AlertThresholds) {
        let total = self.total_jobs.max(1) as f64;
        self.failure_rate = round_to(self.failed as f64 / total, 4);
        self.avg_attempt_count = round_to(self.attempt_total as f64 / total, 3);
        self.avg_retry_delay_seconds =
            round_to(self.retry_delay_total / self.failed.max(1) as f64, 3);
        self.parser_fallback_rate = ratio(self.fallback_successes, self.succeeded);
        self.parse_failure_rate = ratio(self.parse_related_failures, self.failed);
        self.top_failure_reasons = top_entries(&self.failure_reason_counts);
        self.top_parse_failure_classes = top_entries(&self.parse_failure_counts);
        self.recovery_candidates = recovery_candidates(self);
        self.triage_hints = triage_hints(self);
        self.alert_thresholds = thresholds;
    }
}

/// A job's single failure key for the parse-failure histogram.
enum FailureKey {
    Parse(String),
    Fetch(String),
}

impl FailureKey {
    fn as_key(&self) -> &str {
        match self {
            Self::Parse(key) | Self::Fetch(key) => key,
        }
    }

    fn is_parse_related(&self) -> bool {
        match self {
            Self::Parse(key) => FailureClass::from_str(key).map_or(true, |c| c.is_parse_related()),
            Self::Fetch(_) => false,
        }
    }
}

fn failure_key(job: &HarvestJob) -> Option<FailureKey> {
    match &job.parse_strategy {
        Some(ParseStrategy::ParseFailed { class, .. }) => {
            return Some(FailureKey::Parse(class.as_str().to_string()))
        }
        Some(ParseStrategy::FetchFailed(failure)) => {
            return Some(FailureKey::Fetch(format!("fetch_failed:{}", failure)))
        }
        _ => {}
    }
    if job.status != JobStatus::Failed {
        return None;
    }
    let error = job.error.as_deref()?;
    if let Some(caps) = PARSE_ERROR.captures(error) {
        return Some(FailureKey::Parse(caps["class"].to_string()));
    }
    FETCH_ERROR
        .captures(error)
        .map(|caps| FailureKey::Fetch(format!("fetch_failed:{}", &caps["class"])))
}

fn bump(counts: &mut Counts, key: &str) {
    *counts.entry(key.to_string()).or_insert(0) += 1;
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64, 4)
}

/// Highest counts first; ties by key.
fn top_entries(counts: &Counts) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(TOP_ENTRIES);
    entries
}

/// Merge `parse_failed:`, `dom_fallback:` and `recovery:` classes into one
/// list ranked by total count.
fn recovery_candidates(metric: &DomainTelemetry) -> Vec<RecoveryCandidate> {
    let mut merged: BTreeMap<&str, (u64, u64, u64)> = BTreeMap::new();
    for (key, count) in &metric.parse_failure_counts {
        if FailureClass::from_str(key).is_some() {
            merged.entry(key).or_default().0 += count;
        }
    }
    for (key, count) in &metric.fallback_class_counts {
        merged.entry(key).or_default().1 += count;
    }
    for (key, count) in &metric.recovery_strategy_counts {
        merged.entry(key).or_default().2 += count;
    }

    let mut candidates: Vec<RecoveryCandidate> = merged
        .into_iter()
        .map(|(class, (parse_failed, dom_fallback, recovery))| RecoveryCandidate {
            class: class.to_string(),
            parse_failed,
            dom_fallback,
            recovery,
            total: parse_failed + dom_fallback + recovery,
            supported: FailureClass::from_str(class).is_some_and(|c| c.is_recovery_supported()),
        })
        .collect();
    candidates.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.class.cmp(&b.class)));
    candidates
}

fn triage_hints(metric: &DomainTelemetry) -> Vec<String> {
    let parse = |key: &str| metric.parse_failure_counts.get(key).copied().unwrap_or(0);
    let fallback = |key: &str| metric.fallback_class_counts.get(key).copied().unwrap_or(0);
    let mut hints: Vec<&str> = Vec::new();

    let fetch_failures: u64 = metric
        .parse_failure_counts
        .iter()
        .filter(|(k, _)| k.starts_with("fetch_failed:"))
        .map(|(_, v)| v)
        .sum();
    if fetch_failures > 0 {
        hints.push(
            "Fetch failures detected (see `fetch_failed:*`). Check domain reachability, timeouts, and rate limiting before tuning selectors.",
        );
    }
    if parse("domain-selector-mismatch") > 0 || fallback("domain-selector-mismatch") > 0 {
        hints.push(
            "Update `parser_settings.ingredient_selectors` and `parser_settings.instruction_selectors` for this domain.",
        );
    }
    if parse("instruction-structure-mismatch") > 0 {
        hints.push(
            "Set `parser_settings.instruction_heading_keywords` to match this source's section headings.",
        );
    }
    if parse("domain-instructions-sparse") > 0 {
        hints.push(
            "Enable heading fallback and add instruction selectors for nested method blocks.",
        );
    }
    if parse("low-confidence-parse") > 0 {
        hints.push(
            "Tune `min_extraction_confidence` or improve selectors to reduce low-confidence parses.",
        );
    }
    if parse("missing-recipe-markers") > 0 {
        hints.push(
            "Adjust `required_text_markers` for this domain if valid recipe pages are being rejected.",
        );
    }
    if parse("jsonld-parse-failed") > 0 || parse("jsonld-incomplete") > 0 {
        hints.push(
            "Disable JSON-LD for this domain (`parser_settings.enable_jsonld=false`) and rely on domain selectors.",
        );
    }
    if parse("microdata-parse-failed") > 0 {
        hints.push(
            "Disable microdata parsing for this domain (`parser_settings.enable_microdata=false`) and tune DOM selectors.",
        );
    }
    if !metric.recovery_strategy_counts.is_empty() {
        hints.push(
            "Recovery parser is active for this domain; review `recovery:*` strategies and promote stable selectors into parser settings.",
        );
    }
    if metric.compliance_rejections > 0 {
        hints.push(
            "Review compliance reasons and confirm robots/canonical/paywall settings before increasing crawl volume.",
        );
    }
    if hints.is_empty() && metric.failure_rate > 0.2 {
        hints.push(
            "High failure rate with weak class signal: inspect latest failures and add domain-specific parser settings.",
        );
    }
    hints.into_iter().take(MAX_HINTS).map(String::from).collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalTelemetry {
    pub total_jobs: u64,
    pub failed_jobs: u64,
    pub retryable_jobs: u64,
    pub max_attempts: i32,
    pub fallback_class_totals: Counts,
    pub parse_failure_totals: Counts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    pub generated_at: DateTime<Utc>,
    pub global: GlobalTelemetry,
    pub domains: Vec<DomainTelemetry>,
    pub alerts: Vec<Alert>,
}

impl TelemetryReport {
    pub fn domain(&self, domain: &str) -> Option<&DomainTelemetry> {
        self.domains.iter().find(|d| d.domain == domain)
    }
}

/// Policy whose alert settings govern `domain`: exact match first, else a
/// parent domain.
pub fn policy_for_domain<'a>(
    domain: &str,
    policies: &'a [SourcePolicy],
) -> Option<&'a SourcePolicy> {
    policies
        .iter()
        .find(|p| p.domain == domain)
        .or_else(|| policies.iter().find(|p| host_matches_domain(domain, &p.domain)))
}

/// Aggregate jobs into per-domain snapshots and evaluate their alerts.
/// Jobs whose URL has no host are ignored.
pub fn aggregate(
    jobs: &[HarvestJob],
    policies: &[SourcePolicy],
    max_attempts: i32,
    now: DateTime<Utc>,
) -> TelemetryReport {
    let mut domains: BTreeMap<String, DomainTelemetry> = BTreeMap::new();
    let mut global = GlobalTelemetry {
        total_jobs: jobs.len() as u64,
        max_attempts,
        ..Default::default()
    };

    for job in jobs {
        let domain = job.domain();
        if domain.is_empty() {
            continue;
        }
        if job.status == JobStatus::Failed {
            global.failed_jobs += 1;
            if job.attempt_count < max_attempts {
                global.retryable_jobs += 1;
            }
        }
        domains
            .entry(domain.clone())
            .or_insert_with(|| DomainTelemetry::new(&domain))
            .observe(job, max_attempts);
    }

    let mut alerts = Vec::new();
    let domains: Vec<DomainTelemetry> = domains
        .into_values()
        .map(|mut metric| {
            let thresholds = policy_for_domain(&metric.domain, policies)
                .map(|p| AlertThresholds::from_settings(&p.alert_settings))
                .unwrap_or_default();
            metric.finalize(thresholds);
            for (class, count) in &metric.fallback_class_counts {
                *global.fallback_class_totals.entry(class.clone()).or_insert(0) += count;
            }
            for (class, count) in &metric.parse_failure_counts {
                *global.parse_failure_totals.entry(class.clone()).or_insert(0) += count;
            }
            alerts.extend(evaluate_alerts(&metric));
            metric
        })
        .collect();

    TelemetryReport {
        generated_at: now,
        global,
        domains,
        alerts,
    }
}
