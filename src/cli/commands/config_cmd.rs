//! Configuration management commands.

use console::style;

use crate::config::{Config, Settings};

/// Show where configuration came from and the settings it resolved to.
pub fn cmd_config_show(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults (no config file found)".to_string());
    let hash = config.hash();

    println!("{}", style("Configuration").bold());
    println!("  {} Source: {}", style("→").dim(), source);
    println!("  {} Hash: {}", style("→").dim(), &hash[..16]);

    println!("\n{}", style("Effective settings").bold());
    println!("  data_dir               {}", settings.data_dir.display());
    println!("  database               {}", settings.database_url());
    println!("  request_timeout_secs   {}", settings.request_timeout);
    println!(
        "  retry                  base {}s, max {}s, {} attempts",
        settings.retry.base_seconds, settings.retry.max_seconds, settings.retry.max_attempts
    );
    println!(
        "  rate_limits            ingest {}/min, harvest {}/min, auto {}/min",
        settings.rate_limits.ingest_per_minute,
        settings.rate_limits.harvest_per_minute,
        settings.rate_limits.auto_harvest_per_minute
    );
    println!(
        "  throttle               base {}ms, min {}ms, max {}ms, {} per domain",
        settings.throttle.base_delay.as_millis(),
        settings.throttle.min_delay.as_millis(),
        settings.throttle.max_delay.as_millis(),
        settings.throttle.max_concurrent_per_domain
    );
    println!("  workers                {}", settings.workers);
    println!("  sweep_interval_secs    {}", settings.sweep_interval_secs);
    println!("  telemetry_window_jobs  {}", settings.telemetry_window_jobs);
    println!(
        "  calibration            min {} jobs, buffer x{}",
        settings.calibration_min_jobs, settings.calibration_buffer_multiplier
    );
    println!(
        "  internal_token         {}",
        if settings.internal_token.is_some() {
            "set"
        } else {
            "not set"
        }
    );

    Ok(())
}
