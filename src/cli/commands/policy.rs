//! Source policy management commands.

use console::style;

use crate::cli::helpers::{not_found, open_context, print_json, truncate};
use crate::config::Settings;
use crate::models::{MetricType, NewSourcePolicy, SourcePolicyPatch};

pub struct PolicyArgs {
    pub name: String,
    pub domain: String,
    pub metric: String,
    pub seeds: Vec<String>,
    pub respect_robots: bool,
    pub retry_compliance_failures: bool,
}

/// List all source policies.
pub async fn cmd_policy_list(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let policies = ctx.policies.list().await?;

    if policies.is_empty() {
        println!(
            "{} No source policies. Run 'harvest init --seed-defaults' or 'harvest policy add'.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Source Policies").bold());
    println!("{}", "-".repeat(96));
    println!(
        "{:<38} {:<22} {:<14} {:<7} {}",
        "ID", "Domain", "Metric", "Active", "Last Swept"
    );
    println!("{}", "-".repeat(96));

    for policy in policies {
        let last_swept = policy
            .last_swept_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Never".to_string());
        let active = if policy.is_active {
            style("yes").green()
        } else {
            style("no").dim()
        };
        println!(
            "{:<38} {:<22} {:<14} {:<7} {}",
            policy.id,
            truncate(&policy.domain, 21),
            policy.metric_type.as_str(),
            active,
            last_swept
        );
    }

    Ok(())
}

/// Add a source policy.
pub async fn cmd_policy_add(settings: &Settings, args: PolicyArgs) -> anyhow::Result<()> {
    let metric_type = MetricType::from_str(&args.metric)
        .ok_or_else(|| anyhow::anyhow!("Unknown metric type: {}", args.metric))?;

    let mut new = NewSourcePolicy::new(&args.name, &args.domain, metric_type);
    new.seed_urls = args.seeds;
    new.respect_robots = args.respect_robots;
    new.retry_compliance_failures = args.retry_compliance_failures;
    new.validate()?;

    let ctx = open_context(settings).await?;
    if ctx.policies.get_by_domain(&new.domain).await?.is_some() {
        anyhow::bail!("A policy for {} already exists", new.domain);
    }
    let policy = ctx.policies.create(new).await?;

    println!(
        "{} Added policy {} ({})",
        style("✓").green(),
        style(&policy.name).bold(),
        policy.domain
    );
    println!("  {} ID: {}", style("→").dim(), policy.id);
    Ok(())
}

pub async fn cmd_policy_show(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let policy = ctx
        .policies
        .get(id)
        .await?
        .ok_or_else(|| not_found("Policy", id))?;
    print_json(&policy)
}

/// Apply a JSON patch object.
pub async fn cmd_policy_patch(settings: &Settings, id: &str, patch: &str) -> anyhow::Result<()> {
    let patch: SourcePolicyPatch =
        serde_json::from_str(patch).map_err(|e| anyhow::anyhow!("Invalid patch JSON: {}", e))?;

    let ctx = open_context(settings).await?;
    let mut policy = ctx
        .policies
        .get(id)
        .await?
        .ok_or_else(|| not_found("Policy", id))?;
    patch.apply_to(&mut policy)?;
    ctx.policies.update(&policy).await?;

    println!("{} Updated policy {}", style("✓").green(), policy.domain);
    Ok(())
}

pub async fn cmd_policy_delete(settings: &Settings, id: &str, confirm: bool) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let ctx = open_context(settings).await?;
    let policy = ctx
        .policies
        .get(id)
        .await?
        .ok_or_else(|| not_found("Policy", id))?;

    if !confirm {
        print!(
            "Delete policy for {}? Jobs are kept. [y/N] ",
            style(&policy.domain).bold()
        );
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{} Cancelled", style("!").yellow());
            return Ok(());
        }
    }

    ctx.policies.delete(id).await?;
    println!("{} Deleted policy {}", style("✓").green(), policy.domain);
    Ok(())
}
