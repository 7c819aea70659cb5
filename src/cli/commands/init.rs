//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::models::default_policies;
use crate::repository::migrations::run_migrations;
use crate::repository::{DbPool, PolicyRepository};

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings, seed_defaults: bool) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let applied = run_migrations(&settings.database_url()).await?;
    for name in &applied {
        println!("  {} Applied migration {}", style("✓").green(), name);
    }

    if seed_defaults {
        let policies = PolicyRepository::new(DbPool::new(&settings.database_url()));
        let inserted = policies.install_defaults(default_policies()).await?;
        if inserted == 0 {
            println!(
                "  {} Default policies already installed",
                style("!").yellow()
            );
        } else {
            println!(
                "  {} Installed {} default source policies",
                style("✓").green(),
                inserted
            );
        }
    }

    println!(
        "{} Initialized harvest database at {}",
        style("✓").green(),
        settings.database_path().display()
    );

    Ok(())
}
