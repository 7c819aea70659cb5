//! Telemetry and alert reports.

use chrono::{DateTime, Utc};
use console::style;

use crate::cli::helpers::{open_context, print_json, rate};
use crate::config::Settings;
use crate::ops::{Alert, DomainTelemetry, Severity, TelemetryQuery};

fn query(domain: Option<String>, since: Option<&str>) -> anyhow::Result<TelemetryQuery> {
    let since = since
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| anyhow::anyhow!("Invalid --since timestamp {}: {}", raw, e))
        })
        .transpose()?;
    Ok(TelemetryQuery { domain, since })
}

fn print_domain(domain: &DomainTelemetry) {
    println!("\n{}", style(&domain.domain).bold());
    println!(
        "  jobs {}  pending {}  running {}  succeeded {}  failed {}  retryable {}",
        domain.total_jobs,
        domain.pending,
        domain.running,
        style(domain.succeeded).green(),
        style(domain.failed).red(),
        domain.retryable
    );
    println!(
        "  failure {}  fallback {}  parse failure {}  avg attempts {:.2}  compliance {}",
        rate(domain.failure_rate),
        rate(domain.parser_fallback_rate),
        rate(domain.parse_failure_rate),
        domain.avg_attempt_count,
        domain.compliance_rejections
    );
    if !domain.top_parse_failure_classes.is_empty() {
        let classes: Vec<String> = domain
            .top_parse_failure_classes
            .iter()
            .map(|(class, count)| format!("{} ({})", class, count))
            .collect();
        println!("  top failures: {}", classes.join(", "));
    }
    for hint in &domain.triage_hints {
        println!("  {} {}", style("→").dim(), hint);
    }
}

fn print_alert(alert: &Alert) {
    let label = match alert.severity {
        Severity::Critical => style(alert.severity.as_str()).red().bold(),
        Severity::Warning => style(alert.severity.as_str()).yellow(),
    };
    println!(
        "{} [{}] {} {}: {:.3} > {:.3}",
        style("!").yellow(),
        label,
        alert.domain,
        alert.metric,
        alert.actual,
        alert.threshold
    );
    println!("    {}", alert.message);
}

pub async fn cmd_telemetry(
    settings: &Settings,
    domain: Option<String>,
    since: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let query = query(domain, since)?;
    let ctx = open_context(settings).await?;
    let report = ctx.ops.telemetry(&query).await?;

    if json {
        return print_json(&report);
    }

    println!(
        "{} {} jobs, {} failed, {} retryable (max attempts {})",
        style("Telemetry").bold(),
        report.global.total_jobs,
        report.global.failed_jobs,
        report.global.retryable_jobs,
        report.global.max_attempts
    );
    for domain in &report.domains {
        print_domain(domain);
    }
    if !report.alerts.is_empty() {
        println!();
        for alert in &report.alerts {
            print_alert(alert);
        }
    }
    Ok(())
}

pub async fn cmd_alerts(
    settings: &Settings,
    domain: Option<String>,
    since: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let query = query(domain, since)?;
    let ctx = open_context(settings).await?;
    let alerts = ctx.ops.alerts(&query).await?;

    if json {
        return print_json(&alerts);
    }
    if alerts.is_empty() {
        println!("{} No alert thresholds breached", style("✓").green());
    }
    for alert in &alerts {
        print_alert(alert);
    }
    Ok(())
}
