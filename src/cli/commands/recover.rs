//! Parser recovery command.

use console::style;

use crate::cli::helpers::{open_context, print_json};
use crate::config::Settings;
use crate::ops::RecoveryRequest;

pub async fn cmd_recover(
    settings: &Settings,
    policy_id: &str,
    parse_failure: String,
    source_url: Option<String>,
    apply: bool,
) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let request = RecoveryRequest {
        parse_failure,
        source_url,
    };
    let suggestion = ctx.ops.recover(policy_id, &request, apply).await?;

    if !suggestion.supported {
        println!(
            "{} {}",
            style("!").yellow(),
            suggestion.message.as_deref().unwrap_or("Unsupported failure class")
        );
        return Ok(());
    }

    print_json(&suggestion.patch)?;
    if suggestion.applied {
        println!(
            "{} Applied {} parser settings to {}",
            style("✓").green(),
            suggestion.changed_keys.len(),
            suggestion.domain
        );
    } else if suggestion.is_applicable() {
        println!(
            "{} Preview only, re-run with --apply to update {}",
            style("!").yellow(),
            suggestion.domain
        );
    } else {
        println!("{} Nothing to change for {}", style("✓").green(), suggestion.domain);
    }
    Ok(())
}
