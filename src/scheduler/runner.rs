//! Executes one harvest job: claim, fetch, compliance, parse, persist.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::compliance::{evaluate_page_compliance, evaluate_robots, ComplianceResult, RobotsCache};
use crate::error::{HarvestError, Result};
use crate::fetch::PageFetcher;
use crate::models::{
    match_policy, FailureClass, FetchFailure, HarvestJob, JobStatus, ParseStrategy, ParsedRecipe,
    ParserKind, SourcePolicy,
};
use crate::parser::{
    compute_confidence, extract_recipe, parse_raw_text, EffectiveProfile, Page, ParseFailure,
};
use crate::rate_limit::{Clock, SystemClock};
use crate::repository::{JobOutcome, JobRepository, PolicyRepository};

use super::retry::{compute_next_retry, RetryPolicy};

/// How a run ended, before it is written back.
#[derive(Debug)]
enum Execution {
    Succeeded {
        recipe: ParsedRecipe,
        strategy: ParseStrategy,
    },
    Failed {
        error: String,
        strategy: Option<ParseStrategy>,
        compliance_reasons: Option<Vec<String>>,
        /// Spend the remaining retry budget.
        terminal: bool,
    },
    Throttled {
        retry_after_seconds: u64,
    },
}

impl Execution {
    fn failed(error: String, strategy: Option<ParseStrategy>) -> Self {
        Self::Failed {
            error,
            strategy,
            compliance_reasons: None,
            terminal: false,
        }
    }
}

enum PageVerdict {
    Rejected(ComplianceResult),
    Parsed(ParsedRecipe),
    Unparsed(ParseFailure),
}

fn judge_page(body: &str, served_url: &str, job_url: &str, policy: &SourcePolicy) -> PageVerdict {
    let page = Page::parse(body, served_url);
    let compliance = evaluate_page_compliance(&page, job_url, &policy.parser_settings);
    if !compliance.is_allowed() {
        return PageVerdict::Rejected(compliance);
    }
    match extract_recipe(&page, &policy.parser_settings) {
        Ok(mut recipe) => {
            recipe.source_url = job_url.to_string();
            PageVerdict::Parsed(recipe)
        }
        Err(failure) => PageVerdict::Unparsed(failure),
    }
}

fn compliance_failure(compliance: &ComplianceResult, policy: &SourcePolicy) -> Execution {
    Execution::Failed {
        error: compliance.job_error(),
        strategy: Some(ParseStrategy::compliance_rejected()),
        compliance_reasons: Some(compliance.reason_strings()),
        terminal: !policy.retry_compliance_failures,
    }
}

/// Removes a job id from the in-flight set when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn enter(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.insert(id.to_string()) {
            return None;
        }
        Some(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Runs harvest jobs. At most one run per job id is in flight in this
/// process, and the database claim keeps separate processes apart.
pub struct JobRunner {
    jobs: JobRepository,
    policies: PolicyRepository,
    fetcher: Arc<dyn PageFetcher>,
    robots: RobotsCache,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashSet<String>>,
}

impl JobRunner {
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
            robots: RobotsCache::new(),
            retry,
            clock: Arc::new(SystemClock),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn jobs(&self) -> &JobRepository {
        &self.jobs
    }

    /// Release runs whose claim outlived the lease. See
    /// [`JobRepository::release_expired`].
    pub async fn release_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let released = self
            .jobs
            .release_expired(now, self.retry.lease_expiry(now), self.retry.max_attempts)
            .await?;
        if released > 0 {
            warn!("Released {} interrupted job runs", released);
        }
        Ok(released)
    }

    /// Run a job now.
    ///
    /// Jobs that are running or finished come back unchanged. A job whose
    /// retry time or throttle deferral lies ahead is refused; so is one
    /// with no attempts left. When the source throttles us the claim is
    /// undone and `Throttled` carries the hint.
    pub async fn run(&self, id: &str) -> Result<HarvestJob> {
        let Some(_flight) = InFlight::enter(&self.in_flight, id) else {
            debug!("Job {} already in flight", id);
            return self.load(id).await;
        };

        let now = self.clock.now();
        let mut before = self.load(id).await?;
        if before.status == JobStatus::Running && !self.holds_lease(&before, now) {
            self.release_expired(now).await?;
            before = self.load(id).await?;
        }
        if !before.status.is_claimable() {
            return Ok(before);
        }
        if before.attempt_count >= self.retry.max_attempts {
            return Err(HarvestError::InvalidState("Max harvest attempts reached".to_string()));
        }
        if let Some(until) = before.deferred_until.filter(|until| *until > now) {
            return Err(HarvestError::Throttled {
                retry_after_seconds: seconds_until(until, now),
            });
        }
        if let Some(at) = before.next_retry_at.filter(|at| *at > now) {
            return Err(HarvestError::InvalidState(format!(
                "Job is not due for retry until {}",
                at.to_rfc3339()
            )));
        }

        let Some(job) = self.jobs.claim(id, now, self.retry.max_attempts).await? else {
            debug!("Job {} was claimed elsewhere", id);
            return self.load(id).await;
        };
        info!("Running job {} ({}), attempt {}", job.id, job.source_url, job.attempt_count);

        let execution = self.execute(&job).await;
        self.record(&before, &job, execution).await?;
        self.load(id).await
    }

    fn holds_lease(&self, job: &HarvestJob, now: DateTime<Utc>) -> bool {
        job.last_attempt_at
            .is_some_and(|at| at > self.retry.lease_expiry(now))
    }

    async fn load(&self, id: &str) -> Result<HarvestJob> {
        self.jobs
            .get(id)
            .await?
            .ok_or_else(|| HarvestError::NotFound(format!("Job {}", id)))
    }

    async fn record(
        &self,
        before: &HarvestJob,
        job: &HarvestJob,
        execution: Execution,
    ) -> Result<()> {
        let now = self.clock.now();
        let outcome = match execution {
            Execution::Throttled { retry_after_seconds } => {
                let until = now + Duration::seconds(retry_after_seconds as i64);
                self.jobs.defer(before, until, now).await?;
                info!(
                    "Job {} throttled by {}, deferred {}s",
                    job.id,
                    job.domain(),
                    retry_after_seconds
                );
                return Err(HarvestError::Throttled { retry_after_seconds });
            }
            Execution::Succeeded { recipe, strategy } => {
                info!("Job {} succeeded: {}", job.id, strategy);
                JobOutcome {
                    status: JobStatus::Succeeded,
                    error: None,
                    attempt_count: job.attempt_count,
                    next_retry_at: None,
                    parse_strategy: Some(strategy),
                    compliance_reasons: None,
                    candidate: Some(recipe),
                    canonical_name: job.canonical_name.clone(),
                    author: job.author.clone(),
                    signals: job.signals,
                }
            }
            Execution::Failed {
                error,
                strategy,
                compliance_reasons,
                terminal,
            } => {
                let attempt_count = if terminal {
                    job.attempt_count.max(self.retry.max_attempts)
                } else {
                    job.attempt_count
                };
                let next_retry_at = compute_next_retry(attempt_count, now, &self.retry);
                match next_retry_at {
                    Some(at) => warn!("Job {} failed ({}), retry at {}", job.id, error, at),
                    None => warn!("Job {} failed terminally ({})", job.id, error),
                }
                JobOutcome {
                    status: JobStatus::Failed,
                    error: Some(error),
                    attempt_count,
                    next_retry_at,
                    parse_strategy: strategy,
                    compliance_reasons,
                    candidate: None,
                    canonical_name: job.canonical_name.clone(),
                    author: job.author.clone(),
                    signals: job.signals,
                }
            }
        };
        if !self.jobs.finish(&job.id, &outcome, now).await? {
            warn!("Job {} left running state before its outcome was written", job.id);
        }
        Ok(())
    }

    async fn execute(&self, job: &HarvestJob) -> Execution {
        let policies = match self.policies.list_active().await {
            Ok(policies) => policies,
            Err(e) => {
                return Execution::failed(
                    format!("Database error: {}", e),
                    job.parse_strategy.clone(),
                )
            }
        };
        let Some(policy) = match_policy(&job.source_url, &policies) else {
            return Execution::failed(
                format!("Source not allowed ({})", job.domain()),
                job.parse_strategy.clone(),
            );
        };

        match job.raw_text.as_deref().filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => self.execute_raw(job, raw, policy),
            None => self.execute_fetch(job, policy).await,
        }
    }

    /// Jobs carrying text skip the network. A strategy recorded at
    /// discovery time is kept so crawl telemetry survives ingestion.
    fn execute_raw(&self, job: &HarvestJob, raw: &str, policy: &SourcePolicy) -> Execution {
        let strategy = job.parse_strategy.clone().unwrap_or(ParseStrategy::ManualRaw);
        let parsed = parse_raw_text(raw, job.canonical_name.as_deref());
        if parsed.ingredients.len() < 2 || parsed.instructions.is_empty() {
            return Execution::failed(
                format!("Unable to parse recipe ({})", FailureClass::InsufficientPageContent),
                Some(strategy),
            );
        }

        let (parser, recovered, fallback_class) = match &strategy {
            ParseStrategy::Parsed { parser, .. } => (*parser, false, None),
            ParseStrategy::Recovery { class, base, .. } => (*base, true, Some(*class)),
            ParseStrategy::DomFallback {
                class, recovered, ..
            } => (ParserKind::DomFallback, *recovered, Some(*class)),
            _ => (ParserKind::DomFallback, false, None),
        };
        let mut recipe = ParsedRecipe {
            canonical_name: parsed.name,
            description: None,
            ingredients: parsed.ingredients,
            instructions: parsed.instructions,
            author: job.author.clone(),
            signals: job.signals,
            source_url: job.source_url.clone(),
            tags: Vec::new(),
            parser,
            recovered,
            fallback_class,
            extraction_confidence: 0.0,
        };
        let has_profile =
            EffectiveProfile::resolve(&job.source_url, &policy.parser_settings).is_some();
        recipe.extraction_confidence =
            compute_confidence(&recipe, has_profile, &policy.parser_settings);
        Execution::Succeeded { recipe, strategy }
    }

    async fn execute_fetch(&self, job: &HarvestJob, policy: &SourcePolicy) -> Execution {
        let url = job.source_url.as_str();

        if policy.respect_robots {
            let robots = self.robots.get(self.fetcher.as_ref(), url).await;
            if let Some(reason) = evaluate_robots(robots.as_ref(), url) {
                let rejection = ComplianceResult { reasons: vec![reason] };
                return compliance_failure(&rejection, policy);
            }
        }

        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                if let Some(retry_after_seconds) = e.retry_after_seconds() {
                    return Execution::Throttled { retry_after_seconds };
                }
                let class = e.classify().unwrap_or(FetchFailure::Unknown);
                return Execution::failed(e.job_error(), Some(ParseStrategy::FetchFailed(class)));
            }
        };

        match judge_page(&page.body, &page.url, url, policy) {
            PageVerdict::Rejected(compliance) => compliance_failure(&compliance, policy),
            PageVerdict::Unparsed(failure) => {
                Execution::failed(failure.to_string(), Some(failure.strategy()))
            }
            PageVerdict::Parsed(recipe) => {
                let strategy = recipe.strategy();
                Execution::Succeeded { recipe, strategy }
            }
        }
    }
}

fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;

    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::models::{MetricType, NewHarvestJob, NewSourcePolicy};
    use crate::rate_limit::ManualClock;
    use crate::repository::test_pool;

    const NEGRONI: &str = r#"<html><head><title>Negroni</title>
        <script type="application/ld+json">{"@type":"Recipe","name":"Negroni",
          "recipeIngredient":["1 oz gin","1 oz Campari","1 oz sweet vermouth"],
          "recipeInstructions":["Stir with ice.","Strain over a large cube."],
          "aggregateRating":{"ratingValue":4.6,"ratingCount":120}}</script></head>
        <body><h1>Negroni</h1><h2>Ingredients</h2><h2>Instructions</h2></body></html>"#;

    struct Harness {
        _dir: tempfile::TempDir,
        fetcher: Arc<MemoryFetcher>,
        clock: Arc<ManualClock>,
        runner: JobRunner,
    }

    async fn harness(configure: impl FnOnce(&mut NewSourcePolicy)) -> Harness {
        let (dir, pool) = test_pool().await;
        let policies = PolicyRepository::new(pool.clone());
        let mut policy = NewSourcePolicy::new("Example", "example.com", MetricType::Pervasiveness);
        policy.respect_robots = false;
        configure(&mut policy);
        policies.create(policy).await.unwrap();

        let fetcher = Arc::new(MemoryFetcher::new());
        // Whole seconds, so stored timestamps compare exactly.
        let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(0)));
        let runner = JobRunner::new(
            JobRepository::new(pool),
            policies,
            fetcher.clone(),
            RetryPolicy::default(),
        )
        .with_clock(clock.clone());
        Harness {
            _dir: dir,
            fetcher,
            clock,
            runner,
        }
    }

    async fn enqueue(h: &Harness, url: &str) -> HarvestJob {
        h.runner.jobs().create(&NewHarvestJob::web(url)).await.unwrap()
    }

    #[tokio::test]
    async fn test_successful_run() {
        let h = harness(|_| {}).await;
        h.fetcher.insert("https://example.com/recipes/negroni", NEGRONI);
        let job = enqueue(&h, "https://example.com/recipes/negroni").await;

        let done = h.runner.run(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.attempt_count, 1);
        assert!(done.next_retry_at.is_none());
        assert!(done.compliance_reasons.is_none());
        assert_eq!(done.canonical_name.as_deref(), Some("Negroni"));
        assert!(done.parse_strategy.unwrap().to_string().starts_with("jsonld@"));

        // Finished jobs are returned as they are.
        let again = h.runner.run(&job.id).await.unwrap();
        assert_eq!(again.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_schedules_retry() {
        let h = harness(|_| {}).await;
        h.fetcher.insert(
            "https://example.com/recipes/empty",
            "<html><head><title>Empty</title></head><body><h1>Empty</h1><p>ingredients soon</p></body></html>",
        );
        let job = enqueue(&h, "https://example.com/recipes/empty").await;

        let failed = h.runner.run(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempt_count, 1);
        assert!(failed.error.unwrap().starts_with("Unable to parse recipe ("));
        assert!(failed.parse_strategy.unwrap().to_string().starts_with("parse_failed:"));
        let next = failed.next_retry_at.unwrap();
        assert_eq!((next - h.clock.now()).num_seconds(), 300);

        // Not due yet.
        assert!(matches!(h.runner.run(&job.id).await, Err(HarvestError::InvalidState(_))));
        h.clock.advance(Duration::seconds(301));
        let second = h.runner.run(&job.id).await.unwrap();
        assert_eq!(second.attempt_count, 2);
        assert_eq!((second.next_retry_at.unwrap() - h.clock.now()).num_seconds(), 600);
    }

    #[tokio::test]
    async fn test_compliance_rejection_is_terminal_by_default() {
        let h = harness(|_| {}).await;
        h.fetcher.insert(
            "https://example.com/privacy-policy",
            "<html><head><title>Privacy Policy</title></head><body>We keep data.</body></html>",
        );
        let job = enqueue(&h, "https://example.com/privacy-policy").await;

        let failed = h.runner.run(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempt_count, 3);
        assert!(failed.next_retry_at.is_none());
        assert_eq!(failed.compliance_reasons, Some(vec!["non-recipe-page".to_string()]));
        assert_eq!(failed.error.as_deref(), Some("Compliance check failed: non-recipe-page"));
        assert_eq!(
            failed.parse_strategy.unwrap().to_string(),
            "parse_failed:compliance-rejected"
        );
        assert!(matches!(h.runner.run(&job.id).await, Err(HarvestError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_compliance_retry_when_policy_allows() {
        let h = harness(|policy| policy.retry_compliance_failures = true).await;
        h.fetcher.insert(
            "https://example.com/privacy-policy",
            "<html><head><title>Privacy Policy</title></head><body>We keep data.</body></html>",
        );
        let job = enqueue(&h, "https://example.com/privacy-policy").await;
        let failed = h.runner.run(&job.id).await.unwrap();
        assert_eq!(failed.attempt_count, 1);
        assert!(failed.next_retry_at.is_some());
        assert!(failed.compliance_reasons.is_some());
    }

    #[tokio::test]
    async fn test_throttle_defers_without_spending_attempts() {
        let h = harness(|_| {}).await;
        h.fetcher.insert_rate_limited("https://example.com/recipes/negroni", 4);
        let job = enqueue(&h, "https://example.com/recipes/negroni").await;

        match h.runner.run(&job.id).await {
            Err(HarvestError::Throttled {
                retry_after_seconds,
            }) => assert_eq!(retry_after_seconds, 4),
            other => panic!("unexpected {:?}", other),
        }
        let deferred = h.runner.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(deferred.status, JobStatus::Pending);
        assert_eq!(deferred.attempt_count, 0);
        assert!(deferred.last_attempt_at.is_none());
        assert!(deferred.deferred_until.is_some());

        match h.runner.run(&job.id).await {
            Err(HarvestError::Throttled {
                retry_after_seconds,
            }) => assert!(retry_after_seconds <= 4),
            other => panic!("unexpected {:?}", other),
        }

        h.clock.advance(Duration::seconds(5));
        h.fetcher.insert("https://example.com/recipes/negroni", NEGRONI);
        let done = h.runner.run(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_unhinted_rate_limit_defers() {
        let h = harness(|_| {}).await;
        h.fetcher.insert_status("https://example.com/recipes/sazerac", 429, "");
        let job = enqueue(&h, "https://example.com/recipes/sazerac").await;

        match h.runner.run(&job.id).await {
            Err(HarvestError::Throttled {
                retry_after_seconds,
            }) => assert_eq!(retry_after_seconds, 30),
            other => panic!("unexpected {:?}", other),
        }
        let deferred = h.runner.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(deferred.status, JobStatus::Pending);
        assert_eq!(deferred.attempt_count, 0);
        assert!(deferred.next_retry_at.is_none());
        assert!(deferred.error.is_none());
        assert_eq!(
            (deferred.deferred_until.unwrap() - h.clock.now()).num_seconds(),
            30
        );
        assert_eq!(deferred.updated_at, h.clock.now());
    }

    #[tokio::test]
    async fn test_run_interrupted_after_claim_is_picked_up_again() {
        let h = harness(|_| {}).await;
        h.fetcher.insert("https://example.com/recipes/negroni", NEGRONI);
        let job = enqueue(&h, "https://example.com/recipes/negroni").await;

        // Claimed, then the process went away before writing an outcome.
        let claimed = h
            .runner
            .jobs()
            .claim(&job.id, h.clock.now(), 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, JobStatus::Running);

        // Within the lease the run still belongs to its owner.
        h.clock.advance(Duration::seconds(60));
        let held = h.runner.run(&job.id).await.unwrap();
        assert_eq!(held.status, JobStatus::Running);
        assert_eq!(h.runner.release_expired(h.clock.now()).await.unwrap(), 0);

        h.clock.advance(Duration::hours(24));
        let done = h.runner.run(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.attempt_count, 2);
        assert!(done.error.is_none());
        assert_eq!(done.updated_at, h.clock.now());
    }

    #[tokio::test]
    async fn test_fetch_failure_tagged() {
        let h = harness(|_| {}).await;
        h.fetcher.insert_timeout("https://example.com/recipes/slow");
        let job = enqueue(&h, "https://example.com/recipes/slow").await;
        let failed = h.runner.run(&job.id).await.unwrap();
        assert_eq!(failed.parse_strategy.unwrap().to_string(), "fetch_failed:timeout");
        assert!(failed.error.unwrap().starts_with("fetch_failed (timeout): "));
    }

    #[tokio::test]
    async fn test_unknown_source_and_missing_job() {
        let h = harness(|_| {}).await;
        let job = enqueue(&h, "https://unlisted.net/recipes/negroni").await;
        let failed = h.runner.run(&job.id).await.unwrap();
        assert_eq!(failed.error.as_deref(), Some("Source not allowed (unlisted.net)"));
        assert_eq!(h.fetcher.request_count("https://unlisted.net/recipes/negroni"), 0);

        assert!(matches!(h.runner.run("missing").await, Err(HarvestError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_raw_text_job_skips_fetch() {
        let h = harness(|_| {}).await;
        let raw = "Ingredients\n- 2 oz rye\n- 1 oz sweet vermouth\nInstructions\n- Stir with ice.";
        let job = h
            .runner
            .jobs()
            .create(&NewHarvestJob::manual(
                "https://example.com/recipes/manhattan",
                raw,
                Some("Manhattan".to_string()),
            ))
            .await
            .unwrap();
        let done = h.runner.run(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.parse_strategy, Some(ParseStrategy::ManualRaw));
        assert_eq!(done.candidate.unwrap().ingredients.len(), 2);
        assert!(h.fetcher.requests().is_empty());
    }
}
