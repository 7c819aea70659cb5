//! One-shot sweep over due jobs and policies.

use chrono::Utc;
use console::style;

use crate::cli::helpers::{open_context, spinner};
use crate::config::Settings;
use crate::scheduler::{PolicySweepReport, SweepReport};

pub(super) fn print_policy_report(report: &PolicySweepReport) {
    println!(
        "{} Crawled {} seeds from {} policies, queued {} jobs",
        style("✓").green(),
        report.seeds,
        report.policies,
        report.queued
    );
    if report.warnings > 0 {
        println!(
            "  {} {} crawls breached alert thresholds",
            style("!").yellow(),
            report.warnings
        );
    }
    for error in &report.errors {
        println!("  {} {}", style("✗").red(), error);
    }
}

pub(super) fn print_job_report(report: &SweepReport) {
    println!(
        "{} Ran {} jobs: {} succeeded, {} failed, {} deferred, {} skipped",
        style("✓").green(),
        report.claimed,
        style(report.succeeded).green(),
        style(report.failed).red(),
        report.deferred,
        report.skipped
    );
}

pub async fn cmd_sweep(settings: &Settings, limit: i64, policies: bool) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let sweeper = ctx.sweeper();

    if policies {
        let pb = spinner("Sweeping source policies");
        let report = sweeper.sweep_policies(Utc::now()).await;
        pb.finish_and_clear();
        print_policy_report(&report?);
    }

    let pb = spinner("Running due jobs");
    let report = sweeper.sweep_jobs(Utc::now(), limit.max(1)).await;
    pb.finish_and_clear();
    print_job_report(&report?);
    Ok(())
}
