//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod calibrate;
mod config_cmd;
mod daemon;
mod harvest;
mod init;
mod job;
mod policy;
mod recover;
mod serve;
mod sweep;
mod telemetry;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Compliance-gated cocktail recipe harvesting")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(long, global = true, env = "HARVEST_DATA")]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init {
        /// Install the built-in source policies
        #[arg(long)]
        seed_defaults: bool,
    },

    /// Manage source policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Manage harvest jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Crawl from a seed URL and enqueue discovered recipes
    Harvest {
        /// Seed URL
        url: String,
        /// Maximum links followed per page
        #[arg(long, default_value = "40")]
        max_links: usize,
        /// Maximum pages fetched
        #[arg(long, default_value = "40")]
        max_pages: usize,
        /// Maximum recipes parsed
        #[arg(long, default_value = "20")]
        max_recipes: usize,
        /// Maximum link depth from the seed
        #[arg(long, default_value = "2")]
        depth: usize,
        /// Report only, do not enqueue jobs
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run due jobs once
    Sweep {
        /// Maximum jobs to run
        #[arg(short, long, default_value = "100")]
        limit: i64,
        /// Also crawl policies whose interval has elapsed
        #[arg(long)]
        policies: bool,
    },

    /// Sweep policies and jobs continuously until interrupted
    Daemon {
        /// Seconds between sweeps (defaults to sweep_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// Maximum jobs per sweep
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },

    /// Per-domain harvest telemetry
    Telemetry {
        /// Restrict to one domain
        #[arg(long)]
        domain: Option<String>,
        /// Only jobs updated since this RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show breached alert thresholds
    Alerts {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        since: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recommend (or apply) alert thresholds from observed telemetry
    Calibrate {
        /// Write recommendations into policy alert settings
        #[arg(long)]
        apply: bool,
        /// Jobs a domain needs before it is calibrated
        #[arg(long)]
        min_jobs: Option<u64>,
        /// Headroom multiplier over observed values
        #[arg(long)]
        buffer: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Suggest (or apply) parser settings for a failure class
    Recover {
        /// Source policy ID
        policy_id: String,
        /// Failure class or stored strategy tag
        parse_failure: String,
        /// Sample URL on the policy's domain
        #[arg(long)]
        source_url: Option<String>,
        /// Write the patch into the policy's parser settings
        #[arg(long)]
        apply: bool,
    },

    /// Start the HTTP API
    Serve {
        /// Address to bind to (PORT, HOST, or HOST:PORT)
        #[arg(default_value = "127.0.0.1:3030")]
        bind: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// List source policies
    List,
    /// Add a source policy
    Add {
        /// Display name
        name: String,
        /// Bare domain, e.g. example.com
        domain: String,
        /// Metric type (ratings or pervasiveness)
        #[arg(long, default_value = "ratings")]
        metric: String,
        /// Seed URL (repeatable)
        #[arg(long = "seed")]
        seeds: Vec<String>,
        /// Skip robots.txt checks
        #[arg(long)]
        ignore_robots: bool,
        /// Retry compliance rejections like other failures
        #[arg(long)]
        retry_compliance: bool,
    },
    /// Show one policy as JSON
    Show { id: String },
    /// Apply a JSON patch object to a policy
    Patch {
        id: String,
        /// Patch document, e.g. '{"max_pages": 60}'
        patch: String,
    },
    /// Delete a policy
    Delete {
        id: String,
        /// Skip confirmation
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Enqueue a single recipe URL
    Add {
        url: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Enqueue operator-supplied recipe text
    Ingest {
        /// Source URL the text came from
        url: String,
        /// File holding the recipe text (stdin when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        author: Option<String>,
    },
    /// List jobs
    List {
        /// Filter by status (pending, running, succeeded, failed)
        #[arg(long)]
        status: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Show one job as JSON
    Show { id: String },
    /// Run one job now
    Run { id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration and its hash
    Show,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init { seed_defaults } => init::cmd_init(&settings, seed_defaults).await,
        Commands::Policy { command } => match command {
            PolicyCommands::List => policy::cmd_policy_list(&settings).await,
            PolicyCommands::Add {
                name,
                domain,
                metric,
                seeds,
                ignore_robots,
                retry_compliance,
            } => {
                policy::cmd_policy_add(
                    &settings,
                    policy::PolicyArgs {
                        name,
                        domain,
                        metric,
                        seeds,
                        respect_robots: !ignore_robots,
                        retry_compliance_failures: retry_compliance,
                    },
                )
                .await
            }
            PolicyCommands::Show { id } => policy::cmd_policy_show(&settings, &id).await,
            PolicyCommands::Patch { id, patch } => {
                policy::cmd_policy_patch(&settings, &id, &patch).await
            }
            PolicyCommands::Delete { id, confirm } => {
                policy::cmd_policy_delete(&settings, &id, confirm).await
            }
        },
        Commands::Job { command } => match command {
            JobCommands::Add { url, name } => job::cmd_job_add(&settings, &url, name).await,
            JobCommands::Ingest {
                url,
                file,
                name,
                author,
            } => job::cmd_job_ingest(&settings, &url, file.as_deref(), name, author).await,
            JobCommands::List { status, limit } => {
                job::cmd_job_list(&settings, status.as_deref(), limit).await
            }
            JobCommands::Show { id } => job::cmd_job_show(&settings, &id).await,
            JobCommands::Run { id } => job::cmd_job_run(&settings, &id).await,
        },
        Commands::Harvest {
            url,
            max_links,
            max_pages,
            max_recipes,
            depth,
            dry_run,
            json,
        } => {
            harvest::cmd_harvest(
                &settings,
                harvest::HarvestArgs {
                    url,
                    max_links,
                    max_pages,
                    max_recipes,
                    depth,
                    enqueue: !dry_run,
                },
                json,
            )
            .await
        }
        Commands::Sweep { limit, policies } => sweep::cmd_sweep(&settings, limit, policies).await,
        Commands::Daemon { interval, limit } => {
            daemon::cmd_daemon(&settings, interval.unwrap_or(settings.sweep_interval_secs), limit)
                .await
        }
        Commands::Telemetry {
            domain,
            since,
            json,
        } => telemetry::cmd_telemetry(&settings, domain, since.as_deref(), json).await,
        Commands::Alerts {
            domain,
            since,
            json,
        } => telemetry::cmd_alerts(&settings, domain, since.as_deref(), json).await,
        Commands::Calibrate {
            apply,
            min_jobs,
            buffer,
            json,
        } => calibrate::cmd_calibrate(&settings, apply, min_jobs, buffer, json).await,
        Commands::Recover {
            policy_id,
            parse_failure,
            source_url,
            apply,
        } => recover::cmd_recover(&settings, &policy_id, parse_failure, source_url, apply).await,
        Commands::Serve { bind } => serve::cmd_serve(&settings, &bind).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&settings, &config),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_policy_add() {
        let cli = Cli::try_parse_from([
            "harvest",
            "policy",
            "add",
            "Example Bar",
            "example.com",
            "--seed",
            "https://example.com/cocktails/",
            "--ignore-robots",
        ])
        .unwrap();
        match cli.command {
            Commands::Policy {
                command:
                    PolicyCommands::Add {
                        seeds,
                        ignore_robots,
                        metric,
                        ..
                    },
            } => {
                assert_eq!(seeds, vec!["https://example.com/cocktails/".to_string()]);
                assert!(ignore_robots);
                assert_eq!(metric, "ratings");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["harvest", "sweep", "-v", "--limit", "5"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Sweep { limit: 5, policies: false }));
    }
}
