//! Auto-discovery harvest command.

use console::style;

use crate::cli::helpers::{open_context, print_json, spinner};
use crate::config::Settings;
use crate::scheduler::{AutoHarvestRequest, AutoHarvestResponse};

pub struct HarvestArgs {
    pub url: String,
    pub max_links: usize,
    pub max_pages: usize,
    pub max_recipes: usize,
    pub depth: usize,
    pub enqueue: bool,
}

fn print_counts(label: &str, counts: &std::collections::BTreeMap<String, u64>) {
    if counts.is_empty() {
        return;
    }
    println!("  {}", style(label).bold());
    for (key, count) in counts {
        println!("    {:<40} {}", key, count);
    }
}

fn print_response(response: &AutoHarvestResponse) {
    println!(
        "{} Parsed {} recipes, queued {} jobs",
        style("✓").green(),
        response.parsed_count,
        response.queued_job_ids.len()
    );
    if response.compliance_rejections > 0 {
        println!(
            "  {} {} compliance rejections",
            style("!").yellow(),
            response.compliance_rejections
        );
    }
    print_counts("Parsers", &response.parser_stats);
    print_counts("Confidence", &response.confidence_buckets);
    print_counts("Parse failures", &response.parse_failure_counts);
    print_counts("Compliance", &response.compliance_reason_counts);
    print_counts("Skipped", &response.skip_reason_counts);
    for error in &response.errors {
        println!("  {} {}", style("✗").red(), error);
    }
}

pub async fn cmd_harvest(settings: &Settings, args: HarvestArgs, json: bool) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let request = AutoHarvestRequest {
        max_links: args.max_links,
        max_pages: args.max_pages,
        max_recipes: args.max_recipes,
        crawl_depth: args.depth,
        enqueue: args.enqueue,
        ..AutoHarvestRequest::new(&args.url)
    };

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("Crawling {}", request.source_url)))
    };
    let result = ctx.harvester.harvest(&request).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let response = result?;

    if json {
        print_json(&response)
    } else {
        print_response(&response);
        Ok(())
    }
}
