//! Auto-discovery harvest: crawl a source and queue what it yields.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::discovery::{crawl_source, Counts, CrawlOptions, CrawlResult};
use crate::error::{HarvestError, Result};
use crate::fetch::PageFetcher;
use crate::models::{
    match_policy, JobStatus, MetricType, NewHarvestJob, ParseStrategy, ParsedRecipe, SourcePolicy,
    SourceType,
};
use crate::repository::{JobOutcome, JobRepository, PolicyRepository};

use super::retry::{compute_next_retry, RetryPolicy};

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_MAX_ENTRIES: usize = 64;

fn default_source_type() -> SourceType {
    SourceType::Web
}
fn default_max_links() -> usize {
    10
}
fn default_max_pages() -> usize {
    40
}
fn default_max_recipes() -> usize {
    20
}
fn default_crawl_depth() -> usize {
    2
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoHarvestRequest {
    pub source_url: String,
    #[serde(default = "default_source_type")]
    pub source_type: SourceType,
    #[serde(default = "default_max_links")]
    pub max_links: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_recipes")]
    pub max_recipes: usize,
    #[serde(default = "default_crawl_depth")]
    pub crawl_depth: usize,
    #[serde(default = "default_true")]
    pub respect_robots: bool,
    #[serde(default = "default_true")]
    pub enqueue: bool,
}

impl AutoHarvestRequest {
    pub fn new(source_url: &str) -> Self {
        Self {
            source_url: source_url.trim().to_string(),
            source_type: default_source_type(),
            max_links: default_max_links(),
            max_pages: default_max_pages(),
            max_recipes: default_max_recipes(),
            crawl_depth: default_crawl_depth(),
            respect_robots: true,
            enqueue: true,
        }
    }

    /// Request a policy sweep makes for one of its seeds.
    pub fn for_policy_seed(policy: &SourcePolicy, seed: &str) -> Self {
        Self {
            max_links: policy.max_pages.max(1) as usize,
            max_pages: policy.max_pages.max(1) as usize,
            max_recipes: policy.max_recipes.max(1) as usize,
            crawl_depth: policy.crawl_depth.max(0) as usize,
            respect_robots: policy.respect_robots,
            ..Self::new(seed)
        }
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.source_url)
            .map_err(|_| {
                HarvestError::Validation(format!("Invalid source_url: {}", self.source_url))
            })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HarvestError::Validation("source_url must be http(s)".to_string()));
        }
        if self.max_links == 0 || self.max_pages == 0 || self.max_recipes == 0 {
            return Err(HarvestError::Validation(
                "max_links, max_pages and max_recipes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            max_pages: self.max_pages,
            max_recipes: self.max_recipes,
            crawl_depth: self.crawl_depth,
            max_links: self.max_links,
            respect_robots: self.respect_robots,
        }
    }

    fn cache_key(&self, policy: &SourcePolicy) -> String {
        serde_json::json!({
            "source_url": self.source_url,
            "source_type": self.source_type,
            "max_pages": self.max_pages,
            "max_recipes": self.max_recipes,
            "crawl_depth": self.crawl_depth,
            "max_links": self.max_links,
            "respect_robots": self.respect_robots,
            "policy_domain": policy.domain,
            "parser_settings": policy.parser_settings,
        })
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoHarvestResponse {
    pub status: &'static str,
    pub discovered_urls: Vec<String>,
    pub parsed_count: usize,
    pub queued_job_ids: Vec<String>,
    pub parser_stats: Counts,
    pub confidence_buckets: Counts,
    pub fallback_class_counts: Counts,
    pub parse_failure_counts: Counts,
    pub compliance_rejections: u64,
    pub compliance_reason_counts: Counts,
    pub skip_reason_counts: Counts,
    pub errors: Vec<String>,
    /// Failed job recorded for a rejected seed page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_seed_job_id: Option<String>,
}

/// Why a parsed recipe was not queued.
fn skip_reason(
    recipe: &ParsedRecipe,
    policy: &SourcePolicy,
    policies: &[SourcePolicy],
) -> Option<&'static str> {
    if recipe.source_url.trim().is_empty() {
        return Some("missing_url");
    }
    if match_policy(&recipe.source_url, policies).is_none() {
        return Some("not_allowed");
    }
    if policy.metric_type == MetricType::Ratings {
        let signals = &recipe.signals;
        let rating_ok = signals.rating_value.unwrap_or(0.0) >= policy.min_rating_value;
        let count_ok = signals.rating_count.unwrap_or(0) >= policy.min_rating_count;
        if !(count_ok && rating_ok) && !signals.has_social_signal() {
            return Some("insufficient_signals");
        }
    }
    None
}

/// Crawls sources and enqueues discovered recipes.
pub struct AutoHarvester {
    jobs: JobRepository,
    policies: PolicyRepository,
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
    cache: Mutex<HashMap<String, (Instant, CrawlResult)>>,
}

impl AutoHarvester {
    pub fn new(
        jobs: JobRepository,
        policies: PolicyRepository,
        fetcher: Arc<dyn PageFetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            jobs,
            policies,
            fetcher,
            retry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn cached(&self, key: &str) -> Option<CrawlResult> {
        let mut cache = self.cache.lock().await;
        match cache.get(key) {
            Some((at, result)) if at.elapsed() < CACHE_TTL => Some(result.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    async fn remember(&self, key: String, result: &CrawlResult) {
        let mut cache = self.cache.lock().await;
        cache.retain(|_, (at, _)| at.elapsed() < CACHE_TTL);
        while cache.len() >= CACHE_MAX_ENTRIES {
            let oldest = cache
                .iter()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    cache.remove(&oldest);
                }
                None => break,
            }
        }
        cache.insert(key, (Instant::now(), result.clone()));
    }

    pub async fn harvest(&self, request: &AutoHarvestRequest) -> Result<AutoHarvestResponse> {
        request.validate()?;
        let policies = self.policies.list_active().await?;
        let policy = match_policy(&request.source_url, &policies)
            .ok_or_else(|| HarvestError::Validation("Source not allowed".to_string()))?;

        let key = request.cache_key(policy);
        let crawl = match self.cached(&key).await {
            Some(result) => {
                debug!("Using cached crawl of {}", request.source_url);
                result
            }
            None => {
                let result = crawl_source(
                    self.fetcher.as_ref(),
                    &request.source_url,
                    &request.crawl_options(),
                    &policy.parser_settings,
                )
                .await;
                self.remember(key, &result).await;
                result
            }
        };

        let lease_expiry = self.retry.lease_expiry(chrono::Utc::now());
        let mut skip_reason_counts: Counts = BTreeMap::new();
        let mut queued_job_ids = Vec::new();
        for recipe in &crawl.parsed_recipes {
            if let Some(reason) = skip_reason(recipe, policy, &policies) {
                *skip_reason_counts.entry(reason.to_string()).or_insert(0) += 1;
                continue;
            }
            if self.jobs.exists_active_for_url(&recipe.source_url, lease_expiry).await? {
                *skip_reason_counts
                    .entry("existing_job_pending_or_running".to_string())
                    .or_insert(0) += 1;
                continue;
            }
            if request.enqueue {
                let mut new = NewHarvestJob::discovered(recipe);
                new.source_type = request.source_type;
                let job = self.jobs.create(&new).await?;
                queued_job_ids.push(job.id);
            }
        }

        let rejected_seed_job_id = match (&crawl.seed_rejection, request.enqueue) {
            (Some(reasons), true) => self.record_seed_rejection(request, policy, reasons).await?,
            _ => None,
        };

        info!(
            "Auto-harvest of {}: {} parsed, {} queued, {} rejected",
            request.source_url,
            crawl.parsed_recipes.len(),
            queued_job_ids.len(),
            crawl.compliance_rejections
        );

        Ok(AutoHarvestResponse {
            status: "ok",
            parsed_count: crawl.parsed_recipes.len(),
            discovered_urls: crawl.discovered_urls,
            queued_job_ids,
            parser_stats: crawl.parser_stats,
            confidence_buckets: crawl.confidence_buckets,
            fallback_class_counts: crawl.fallback_class_counts,
            parse_failure_counts: crawl.parse_failure_counts,
            compliance_rejections: crawl.compliance_rejections,
            compliance_reason_counts: crawl.compliance_reason_counts,
            skip_reason_counts,
            errors: crawl.errors,
            rejected_seed_job_id,
        })
    }

    /// Record a failed job for a seed the compliance gate refused, unless
    /// one is already queued for that URL.
    async fn record_seed_rejection(
        &self,
        request: &AutoHarvestRequest,
        policy: &SourcePolicy,
        reasons: &[String],
    ) -> Result<Option<String>> {
        let now = chrono::Utc::now();
        if self
            .jobs
            .exists_active_for_url(&request.source_url, self.retry.lease_expiry(now))
            .await?
        {
            return Ok(None);
        }
        let mut new = NewHarvestJob::web(&request.source_url);
        new.source_type = request.source_type;
        let attempt_count = if policy.retry_compliance_failures {
            1
        } else {
            self.retry.max_attempts.max(1)
        };
        let outcome = JobOutcome {
            status: JobStatus::Failed,
            error: Some(format!("Compliance check failed: {}", reasons.join(", "))),
            attempt_count,
            next_retry_at: compute_next_retry(attempt_count, now, &self.retry),
            parse_strategy: Some(ParseStrategy::compliance_rejected()),
            compliance_reasons: Some(reasons.to_vec()),
            candidate: None,
            canonical_name: None,
            author: None,
            signals: Default::default(),
        };
        let job = self.jobs.record(&new, &outcome).await?;
        info!("Recorded compliance rejection of {} as job {}", request.source_url, job.id);
        Ok(Some(job.id))
    }
}
