//! Harvest job commands.

use std::io::Read;
use std::path::Path;

use console::style;

use crate::cli::helpers::{not_found, open_context, print_json, truncate};
use crate::config::Settings;
use crate::error::HarvestError;
use crate::models::{HarvestJob, JobStatus, NewHarvestJob};

fn status_style(status: JobStatus) -> console::StyledObject<&'static str> {
    match status {
        JobStatus::Succeeded => style(status.as_str()).green(),
        JobStatus::Failed => style(status.as_str()).red(),
        JobStatus::Running => style(status.as_str()).cyan(),
        JobStatus::Pending => style(status.as_str()).yellow(),
    }
}

fn print_job_summary(job: &HarvestJob) {
    println!("  {} ID: {}", style("→").dim(), job.id);
    println!("  {} Status: {}", style("→").dim(), status_style(job.status));
    println!("  {} Attempts: {}", style("→").dim(), job.attempt_count);
    if let Some(ref strategy) = job.parse_strategy {
        println!("  {} Strategy: {}", style("→").dim(), strategy);
    }
    if let Some(confidence) = job.extraction_confidence {
        println!("  {} Confidence: {:.3}", style("→").dim(), confidence);
    }
    if let Some(ref error) = job.error {
        println!("  {} Error: {}", style("→").dim(), style(error).red());
    }
    if let Some(next) = job.next_retry_at {
        println!(
            "  {} Next retry: {}",
            style("→").dim(),
            next.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

pub async fn cmd_job_add(
    settings: &Settings,
    url: &str,
    name: Option<String>,
) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let mut new = NewHarvestJob::web(url);
    new.canonical_name = name;
    let job = ctx.jobs.create(&new).await?;
    println!("{} Queued {}", style("✓").green(), job.source_url);
    print_job_summary(&job);
    Ok(())
}

/// Enqueue recipe text read from a file or stdin.
pub async fn cmd_job_ingest(
    settings: &Settings,
    url: &str,
    file: Option<&Path>,
    name: Option<String>,
    author: Option<String>,
) -> anyhow::Result<()> {
    let raw_text = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if raw_text.trim().is_empty() {
        anyhow::bail!("Recipe text is empty");
    }

    let ctx = open_context(settings).await?;
    let mut new = NewHarvestJob::manual(url, &raw_text, name);
    new.author = author;
    let job = ctx.jobs.create(&new).await?;
    println!("{} Queued manual recipe for {}", style("✓").green(), job.source_url);
    print_job_summary(&job);
    Ok(())
}

pub async fn cmd_job_list(
    settings: &Settings,
    status: Option<&str>,
    limit: i64,
) -> anyhow::Result<()> {
    let status = match status {
        Some(raw) => Some(
            JobStatus::from_str(raw).ok_or_else(|| anyhow::anyhow!("Unknown status: {}", raw))?,
        ),
        None => None,
    };

    let ctx = open_context(settings).await?;
    let jobs = ctx.jobs.list(status, limit.clamp(1, 500)).await?;
    if jobs.is_empty() {
        println!("{} No jobs", style("!").yellow());
        return Ok(());
    }

    println!("{:<38} {:<10} {:<4} {:<36} URL", "ID", "Status", "Try", "Strategy");
    println!("{}", "-".repeat(120));
    for job in jobs {
        let strategy = job
            .parse_strategy
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<10} {:<4} {:<36} {}",
            job.id,
            status_style(job.status),
            job.attempt_count,
            truncate(&strategy, 35),
            job.source_url
        );
    }
    Ok(())
}

pub async fn cmd_job_show(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let job = ctx.jobs.get(id).await?.ok_or_else(|| not_found("Job", id))?;
    print_json(&job)
}

/// Run one job now.
pub async fn cmd_job_run(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    match ctx.runner.run(id).await {
        Ok(job) => {
            let icon = if job.status == JobStatus::Succeeded {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!("{} {}", icon, job.source_url);
            print_job_summary(&job);
            Ok(())
        }
        Err(HarvestError::Throttled {
            retry_after_seconds,
        }) => {
            println!(
                "{} Rate limited, job deferred for {}s (no attempt used)",
                style("!").yellow(),
                retry_after_seconds
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
