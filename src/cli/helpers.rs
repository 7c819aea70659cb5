//! Shared helper functions for CLI commands.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Settings;
use crate::context::HarvestContext;
use crate::repository::migrations::run_migrations;

/// Bring the database up to date and wire the services.
pub async fn open_context(settings: &Settings) -> anyhow::Result<HarvestContext> {
    settings.ensure_directories()?;
    run_migrations(&settings.database_url()).await?;
    Ok(HarvestContext::from_settings(settings)?)
}

/// Spinner shown while a long-running step works.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate a string for columnar output.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

pub fn rate(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

pub fn not_found(what: &str, id: &str) -> anyhow::Error {
    anyhow::anyhow!("{} {} not found", what, style(id).bold())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("negroni", 10), "negroni");
        assert_eq!(truncate("a very long cocktail name", 10), "a very ...");
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(0.25), "25.0%");
    }
}
