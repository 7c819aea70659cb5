//! Alert threshold calibration command.

use console::style;

use crate::cli::helpers::{open_context, print_json};
use crate::config::Settings;
use crate::ops::{CalibrationOptions, CalibrationStatus};

pub async fn cmd_calibrate(
    settings: &Settings,
    apply: bool,
    min_jobs: Option<u64>,
    buffer: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let options = CalibrationOptions {
        apply,
        min_jobs: min_jobs.unwrap_or(settings.calibration_min_jobs.max(1) as u64),
        buffer_multiplier: buffer.unwrap_or(settings.calibration_buffer_multiplier),
    };

    let ctx = open_context(settings).await?;
    let report = ctx.ops.calibrate(&options).await?;

    if json {
        return print_json(&report);
    }

    for entry in &report.recommendations {
        let status = match entry.status {
            CalibrationStatus::InsufficientData => style(entry.status.as_str()).dim(),
            CalibrationStatus::Recommended => style(entry.status.as_str()).cyan(),
            CalibrationStatus::Calibrated => style(entry.status.as_str()).green(),
        };
        println!("{:<28} {}", entry.domain, status);
        if let Some(ref reason) = entry.reason {
            println!("  {} {}", style("→").dim(), reason);
        }
        if let Some(ref recommended) = entry.recommended_alert_settings {
            for (key, value) in recommended {
                println!("  {} {} = {}", style("→").dim(), key, value);
            }
        }
    }

    if apply {
        println!(
            "{} Calibrated {} domains",
            style("✓").green(),
            report.updated_domains.len()
        );
    } else {
        println!(
            "{} Preview only, re-run with --apply to write thresholds",
            style("!").yellow()
        );
    }
    Ok(())
}
