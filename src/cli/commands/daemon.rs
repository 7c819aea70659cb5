//! Continuous sweep loop.

use std::time::Duration;

use chrono::Utc;
use console::style;
use tracing::warn;

use crate::cli::helpers::open_context;
use crate::config::Settings;

use super::sweep::{print_job_report, print_policy_report};

/// Sweep policies then jobs every `interval` seconds until Ctrl-C.
pub async fn cmd_daemon(settings: &Settings, interval: u64, limit: i64) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let sweeper = ctx.sweeper();
    let interval = interval.max(1);

    println!(
        "{} Harvest daemon started, sweeping every {}s",
        style("→").cyan(),
        interval
    );
    println!("  Press Ctrl+C to stop");

    loop {
        match sweeper.sweep_policies(Utc::now()).await {
            Ok(report) if report.seeds > 0 => print_policy_report(&report),
            Ok(_) => {}
            Err(e) => warn!("Policy sweep failed: {}", e),
        }
        match sweeper.sweep_jobs(Utc::now(), limit.max(1)).await {
            Ok(report) if report.claimed > 0 => print_job_report(&report),
            Ok(_) => {}
            Err(e) => warn!("Job sweep failed: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("{} Shutting down", style("↻").cyan());
                return Ok(());
            }
        }
    }
}
