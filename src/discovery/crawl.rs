//! Bounded breadth-first crawl of one source.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::compliance::{
    evaluate_page_compliance, evaluate_robots, fetch_robots, ComplianceReason, ComplianceResult,
};
use crate::fetch::PageFetcher;
use crate::models::{
    FailureClass, ParseStrategy, ParsedRecipe, ParserKind, SettingsMap, SourcePolicy,
};
use crate::parser::{bool_setting, extract_recipe, normalize_url, Page, ParseFailure};

use super::links::discover_recipe_links;
use super::sitemap::discover_sitemap_links;

/// Crawl limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub max_recipes: usize,
    pub crawl_depth: usize,
    pub max_links: usize,
    pub respect_robots: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 40,
            max_recipes: 20,
            crawl_depth: 2,
            max_links: 10,
            respect_robots: true,
        }
    }
}

impl CrawlOptions {
    /// Limits taken from a policy.
    pub fn from_policy(policy: &SourcePolicy, max_links: usize) -> Self {
        Self {
            max_pages: policy.max_pages.max(1) as usize,
            max_recipes: policy.max_recipes.max(1) as usize,
            crawl_depth: policy.crawl_depth.max(0) as usize,
            max_links: max_links.max(1),
            respect_robots: policy.respect_robots,
        }
    }
}

pub type Counts = BTreeMap<String, u64>;

fn bump(counts: &mut Counts, key: impl Into<String>) {
    *counts.entry(key.into()).or_insert(0) += 1;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlResult {
    pub discovered_urls: Vec<String>,
    pub parsed_recipes: Vec<ParsedRecipe>,
    pub parser_stats: Counts,
    pub confidence_buckets: Counts,
    pub fallback_class_counts: Counts,
    pub parse_failure_counts: Counts,
    pub compliance_rejections: u64,
    pub compliance_reason_counts: Counts,
    pub errors: Vec<String>,
    /// Reasons the seed page itself was rejected, if it was.
    pub seed_rejection: Option<Vec<String>>,
}

impl CrawlResult {
    fn reject(&mut self, url: &str, result: &ComplianceResult, is_seed: bool) {
        self.compliance_rejections += 1;
        for reason in &result.reasons {
            bump(&mut self.compliance_reason_counts, reason.as_str());
        }
        let reasons = result.reason_strings();
        self.errors
            .push(format!("{}: compliance check failed ({})", url, reasons.join(", ")));
        if is_seed {
            self.seed_rejection = Some(reasons);
        }
    }

    fn accept(&mut self, recipe: ParsedRecipe) {
        let stat_key = match recipe.strategy() {
            ParseStrategy::Recovery { class, base, .. } => {
                format!("recovery:{}:{}", class, base.as_str())
            }
            _ => recipe.parser.as_str().to_string(),
        };
        bump(&mut self.parser_stats, stat_key);
        bump(&mut self.confidence_buckets, recipe.confidence_bucket().as_str());
        if recipe.parser == ParserKind::DomFallback {
            let class = recipe.fallback_class.unwrap_or(FailureClass::Unclassified);
            bump(&mut self.fallback_class_counts, class.as_str());
        }
        if !self.discovered_urls.contains(&recipe.source_url) {
            self.discovered_urls.push(recipe.source_url.clone());
        }
        self.parsed_recipes.push(recipe);
    }

    fn parse_failed(&mut self, url: &str, failure: &ParseFailure) {
        bump(&mut self.parse_failure_counts, failure.class.as_str());
        self.errors
            .push(format!("{}: parse failed ({})", url, failure.detail()));
    }
}

/// What one fetched page yielded. Built synchronously so the parsed
/// document never lives across an await.
enum PageOutcome {
    Rejected(ComplianceResult),
    Parsed(ParsedRecipe),
    Failed { failure: ParseFailure, links: Vec<String> },
}

fn examine_page(
    body: &str,
    served_url: &str,
    requested_url: &str,
    settings: &SettingsMap,
    expand_links: bool,
    max_links: usize,
) -> PageOutcome {
    let page = Page::parse(body, served_url);
    let compliance = evaluate_page_compliance(&page, requested_url, settings);
    if !compliance.is_allowed() {
        return PageOutcome::Rejected(compliance);
    }
    match extract_recipe(&page, settings) {
        Ok(mut recipe) => {
            recipe.source_url = requested_url.to_string();
            PageOutcome::Parsed(recipe)
        }
        Err(failure) => {
            let links = if expand_links && failure.class != FailureClass::LowConfidenceParse {
                discover_recipe_links(body, served_url, max_links, settings)
            } else {
                Vec::new()
            };
            PageOutcome::Failed { failure, links }
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

/// Crawl from `seed_url`, parsing every compliant page.
///
/// Pages that parse are collected as recipes; pages that do not are
/// treated as listings and expanded (same host only) until `crawl_depth`.
/// With `use_sitemaps` (default: seed path is `/`) sitemap entries are
/// queued first.
pub async fn crawl_source(
    fetcher: &dyn PageFetcher,
    seed_url: &str,
    options: &CrawlOptions,
    settings: &SettingsMap,
) -> CrawlResult {
    let seed = normalize_url(seed_url);
    let mut result = CrawlResult::default();
    let seed_host = host_of(&seed);

    let seed_path = Url::parse(&seed)
        .map(|u| u.path().trim().to_string())
        .unwrap_or_default();
    let at_root = seed_path.is_empty() || seed_path == "/";
    let use_sitemaps = bool_setting(settings, "use_sitemaps", at_root);

    let robots = if options.respect_robots || use_sitemaps {
        fetch_robots(fetcher, &seed).await
    } else {
        None
    };
    if options.respect_robots && robots.as_ref().is_some_and(|r| r.disallows_all()) {
        info!("robots.txt disallows all crawling of {}", seed);
        result.compliance_rejections = 1;
        bump(
            &mut result.compliance_reason_counts,
            ComplianceReason::RobotsDisallowAll.as_str(),
        );
        result.errors.push("robots disallow all".to_string());
        result.seed_rejection =
            Some(vec![ComplianceReason::RobotsDisallowAll.as_str().to_string()]);
        return result;
    }

    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    queue.push_back((seed.clone(), 0));

    if use_sitemaps {
        let links =
            discover_sitemap_links(fetcher, &seed, robots.as_ref(), options.max_links, settings)
                .await;
        for link in links {
            if queue.len() >= options.max_pages {
                break;
            }
            let link = normalize_url(&link);
            if !link.is_empty() && host_of(&link) == seed_host {
                queue.push_back((link, 1));
            }
        }
    }

    while let Some((url, depth)) = queue.pop_front() {
        if visited.len() >= options.max_pages
            || result.parsed_recipes.len() >= options.max_recipes
        {
            break;
        }
        let url = normalize_url(&url);
        if url.is_empty() || !visited.insert(url.clone()) {
            continue;
        }
        let is_seed = url == seed;

        if options.respect_robots {
            if let Some(reason) = evaluate_robots(robots.as_ref(), &url) {
                let rejection = ComplianceResult { reasons: vec![reason] };
                result.reject(&url, &rejection, is_seed);
                continue;
            }
        }

        let fetched = match fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                let class = e
                    .classify()
                    .map(|c| c.as_string())
                    .unwrap_or_else(|| "throttled".to_string());
                debug!("Skipping {}: {}", url, e);
                bump(&mut result.parse_failure_counts, format!("fetch_failed:{}", class));
                result.errors.push(format!("{}: fetch_failed ({})", url, class));
                continue;
            }
        };

        match examine_page(
            &fetched.body,
            &fetched.url,
            &url,
            settings,
            depth < options.crawl_depth,
            options.max_links,
        ) {
            PageOutcome::Rejected(compliance) => {
                debug!("{} rejected: {:?}", url, compliance.reasons);
                result.reject(&url, &compliance, is_seed);
            }
            PageOutcome::Parsed(recipe) => {
                result.accept(recipe);
            }
            PageOutcome::Failed { failure, links } => {
                result.parse_failed(&url, &failure);
                for link in links {
                    if visited.len() + queue.len() >= options.max_pages {
                        break;
                    }
                    let link = normalize_url(&link);
                    if link.is_empty() || visited.contains(&link) || host_of(&link) != seed_host {
                        continue;
                    }
                    queue.push_back((link, depth + 1));
                }
            }
        }
    }

    info!(
        "Crawled {}: {} pages, {} recipes, {} rejected",
        seed,
        visited.len(),
        result.parsed_recipes.len(),
        result.compliance_rejections
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;

    async fn crawl(fetcher: &MemoryFetcher, seed: &str, options: &CrawlOptions) -> CrawlResult {
        crawl_source(fetcher, seed, options, &SettingsMap::new()).await
    }

    const LISTING: &str = r#"<html><head><title>Cocktails</title></head><body>
        <h1>Our cocktails</h1>
        <a href="/recipes/negroni">Negroni</a>
        <a href="/recipes/gimlet">Gimlet</a>
        <a href="https://other.com/recipes/daiquiri">Elsewhere</a>
        </body></html>"#;

    fn recipe_page(name: &str) -> String {
        format!(
            r#"<html><head><title>{name}</title>
            <script type="application/ld+json">{{"@type":"Recipe","name":"{name}",
              "recipeIngredient":["1 oz gin","1 oz Campari","1 oz sweet vermouth"],
              "recipeInstructions":["Stir with ice.","Strain over a large cube."],
              "aggregateRating":{{"ratingValue":4.6,"ratingCount":120}}}}</script></head>
            <body><h1>{name}</h1><h2>Ingredients</h2><h2>Instructions</h2></body></html>"#
        )
    }

    fn options() -> CrawlOptions {
        CrawlOptions {
            respect_robots: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_crawls_listing_into_recipes() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://example.com/collections/gin", LISTING);
        fetcher.insert("https://example.com/recipes/negroni", &recipe_page("Negroni"));
        fetcher.insert("https://example.com/recipes/gimlet", &recipe_page("Gimlet"));

        let result = crawl_source(
            &fetcher,
            "https://example.com/collections/gin",
            &options(),
            &SettingsMap::new(),
        )
        .await;
        assert_eq!(
            result.discovered_urls,
            vec!["https://example.com/recipes/negroni", "https://example.com/recipes/gimlet"]
        );
        assert_eq!(result.parser_stats.get("jsonld"), Some(&2));
        assert_eq!(result.parse_failure_counts.len(), 1);
        assert_eq!(result.compliance_rejections, 0);
        assert!(result.seed_rejection.is_none());
        assert_eq!(fetcher.request_count("https://other.com/recipes/daiquiri"), 0);
    }

    #[tokio::test]
    async fn test_respects_limits() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://example.com/collections/gin", LISTING);
        fetcher.insert("https://example.com/recipes/negroni", &recipe_page("Negroni"));
        fetcher.insert("https://example.com/recipes/gimlet", &recipe_page("Gimlet"));

        let limited = CrawlOptions {
            max_recipes: 1,
            ..options()
        };
        let result = crawl(&fetcher, "https://example.com/collections/gin", &limited).await;
        assert_eq!(result.parsed_recipes.len(), 1);

        let shallow = CrawlOptions {
            crawl_depth: 0,
            ..options()
        };
        let result = crawl(&fetcher, "https://example.com/collections/gin", &shallow).await;
        assert!(result.parsed_recipes.is_empty());
    }

    #[tokio::test]
    async fn test_seed_rejection_and_robots() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert(
            "https://example.com/privacy-policy",
            "<html><head><title>Privacy Policy</title></head><body>Data.</body></html>",
        );
        let result = crawl(&fetcher, "https://example.com/privacy-policy", &options()).await;
        assert_eq!(result.compliance_rejections, 1);
        assert_eq!(result.compliance_reason_counts.get("non-recipe-page"), Some(&1));
        assert_eq!(result.seed_rejection, Some(vec!["non-recipe-page".to_string()]));

        fetcher.insert("https://example.com/robots.txt", "User-agent: *\nDisallow: /\n");
        let strict = CrawlOptions::default();
        let result = crawl(&fetcher, "https://example.com/collections/gin", &strict).await;
        assert_eq!(result.errors, vec!["robots disallow all"]);
        assert_eq!(result.compliance_reason_counts.get("robots-disallow-all"), Some(&1));
    }

    #[tokio::test]
    async fn test_fetch_failures_counted() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert_timeout("https://example.com/collections/gin");
        let result = crawl(&fetcher, "https://example.com/collections/gin", &options()).await;
        assert_eq!(result.parse_failure_counts.get("fetch_failed:timeout"), Some(&1));
        assert_eq!(
            result.errors,
            vec!["https://example.com/collections/gin: fetch_failed (timeout)"]
        );
    }

    #[tokio::test]
    async fn test_sitemaps_for_root_seed() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://example.com/", "<html><body><h1>Home</h1></body></html>");
        fetcher.insert(
            "https://example.com/sitemap.xml",
            "<urlset><url><loc>https://example.com/recipes/negroni</loc></url></urlset>",
        );
        fetcher.insert("https://example.com/recipes/negroni", &recipe_page("Negroni"));
        let result = crawl(&fetcher, "https://example.com/", &options()).await;
        assert_eq!(result.discovered_urls, vec!["https://example.com/recipes/negroni"]);
    }
}
