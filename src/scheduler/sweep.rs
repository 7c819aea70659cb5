//! Periodic sweeps over runnable jobs and due source policies.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};
use crate::models::{HarvestJob, JobStatus, SourcePolicy};
use crate::parser::float_setting;
use crate::repository::{JobRepository, PolicyRepository};

use super::auto_harvest::{AutoHarvestRequest, AutoHarvestResponse, AutoHarvester};
use super::runner::JobRunner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicySweepReport {
    pub policies: usize,
    pub seeds: usize,
    pub queued: usize,
    /// Seeds whose crawl breached the policy's alert thresholds.
    pub warnings: usize,
    pub errors: Vec<String>,
}

/// Whether a crawl looks unhealthy against the policy's alert settings.
fn crawl_breaches_alerts(response: &AutoHarvestResponse, policy: &SourcePolicy) -> bool {
    let parsed = response.parsed_count.max(1) as f64;
    let fallback = response.parser_stats.get("dom_fallback").copied().unwrap_or(0) as f64;
    let parse_failures: u64 = response.parse_failure_counts.values().sum();

    let max_fallback_rate = float_setting(&policy.alert_settings, "max_parser_fallback_rate", 0.6);
    let max_parse_failure_rate =
        float_setting(&policy.alert_settings, "max_parse_failure_rate", 0.3);
    let max_rejections = float_setting(&policy.alert_settings, "max_compliance_rejections", 5.0);

    fallback / parsed > max_fallback_rate
        || parse_failures as f64 / parsed > max_parse_failure_rate
        || response.compliance_rejections as f64 > max_rejections
}

/// Split jobs into one queue per source domain, keeping their order.
fn domain_queues(jobs: Vec<HarvestJob>) -> Vec<Vec<HarvestJob>> {
    let mut order = Vec::new();
    let mut queues: HashMap<String, Vec<HarvestJob>> = HashMap::new();
    for job in jobs {
        let domain = job.domain();
        if !queues.contains_key(&domain) {
            order.push(domain.clone());
        }
        queues.entry(domain).or_default().push(job);
    }
    order
        .into_iter()
        .filter_map(|domain| queues.remove(&domain))
        .collect()
}

/// Runs batches of due work over a bounded pool of concurrent tasks.
///
/// Each domain gets its own queue running at most `per_domain` jobs at a
/// time, so a worker slot is only taken by a job its domain can serve now.
pub struct Sweeper {
    runner: Arc<JobRunner>,
    harvester: Arc<AutoHarvester>,
    jobs: JobRepository,
    policies: PolicyRepository,
    workers: usize,
    per_domain: usize,
}

impl Sweeper {
    pub fn new(
        runner: Arc<JobRunner>,
        harvester: Arc<AutoHarvester>,
        jobs: JobRepository,
        policies: PolicyRepository,
        workers: usize,
    ) -> Self {
        Self {
            runner,
            harvester,
            jobs,
            policies,
            workers: workers.max(1),
            per_domain: 1,
        }
    }

    /// Concurrent jobs per domain. Match the fetch throttle's per-domain
    /// permits so queued jobs never wait on a permit while holding a worker.
    pub fn with_per_domain(mut self, per_domain: usize) -> Self {
        self.per_domain = per_domain.max(1);
        self
    }

    /// Runnable jobs at `now`: pending oldest first, then failed jobs whose
    /// retry is due. Runs interrupted past their lease are released first.
    pub async fn runnable_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<HarvestJob>> {
        self.runner.release_expired(now).await?;
        let max_attempts = self.runner.retry_policy().max_attempts;
        let mut jobs = self.jobs.list_pending(now, limit).await?;
        jobs.extend(self.jobs.list_retryable(now, max_attempts, limit).await?);

        let mut seen = HashSet::new();
        jobs.retain(|job| seen.insert(job.id.clone()) && job.is_runnable(now, max_attempts));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    /// Run up to `limit` runnable jobs.
    pub async fn sweep_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<SweepReport> {
        let jobs = self.runnable_jobs(now, limit).await?;
        if jobs.is_empty() {
            return Ok(SweepReport::default());
        }
        let queues = domain_queues(jobs);
        info!(
            "Sweeping {} domains with {} workers",
            queues.len(),
            self.workers
        );

        let slots = Arc::new(Semaphore::new(self.workers));
        let per_domain = self.per_domain;
        let lanes = queues.len();
        let results: Vec<(HarvestJob, Result<HarvestJob>)> = stream::iter(queues)
            .map(|queue| {
                let runner = self.runner.clone();
                let slots = slots.clone();
                async move {
                    stream::iter(queue)
                        .map(|job| {
                            let runner = runner.clone();
                            let slots = slots.clone();
                            async move {
                                let result = match slots.acquire_owned().await {
                                    Ok(_slot) => {
                                        debug!("Worker took job {} ({})", job.id, job.domain());
                                        runner.run(&job.id).await
                                    }
                                    Err(_) => {
                                        Err(HarvestError::Other("Worker pool closed".to_string()))
                                    }
                                };
                                (job, result)
                            }
                        })
                        .buffer_unordered(per_domain)
                        .collect::<Vec<_>>()
                        .await
                }
            })
            .buffer_unordered(lanes)
            .flat_map(stream::iter)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (before, result) in results {
            match result {
                Ok(after) if after.attempt_count > before.attempt_count => {
                    report.claimed += 1;
                    match after.status {
                        JobStatus::Succeeded => report.succeeded += 1,
                        _ => report.failed += 1,
                    }
                }
                Ok(_) => report.skipped += 1,
                Err(HarvestError::Throttled { .. }) => report.deferred += 1,
                Err(HarvestError::InvalidState(_)) => report.skipped += 1,
                Err(e) => {
                    warn!("Job {} could not run: {}", before.id, e);
                    report.skipped += 1;
                }
            }
        }
        info!(
            "Sweep finished: {} claimed, {} succeeded, {} failed, {} deferred, {} skipped",
            report.claimed, report.succeeded, report.failed, report.deferred, report.skipped
        );
        Ok(report)
    }

    /// Auto-harvest every seed of each active policy whose crawl interval
    /// has elapsed.
    pub async fn sweep_policies(&self, now: DateTime<Utc>) -> Result<PolicySweepReport> {
        let mut report = PolicySweepReport::default();
        for policy in self.policies.list_active().await? {
            if !policy.is_sweep_due(now) {
                continue;
            }
            report.policies += 1;
            for seed in &policy.seed_urls {
                report.seeds += 1;
                let request = AutoHarvestRequest::for_policy_seed(&policy, seed);
                match self.harvester.harvest(&request).await {
                    Ok(response) => {
                        report.queued += response.queued_job_ids.len();
                        if crawl_breaches_alerts(&response, &policy) {
                            warn!("Crawl of {} breached alert thresholds", seed);
                            report.warnings += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Auto-harvest of {} failed: {}", seed, e);
                        report.errors.push(format!("{}: {}", seed, e));
                    }
                }
            }
            self.policies.mark_swept(&policy.id, now).await?;
        }
        if report.policies > 0 {
            info!(
                "Policy sweep: {} policies, {} seeds, {} queued, {} warnings",
                report.policies, report.seeds, report.queued, report.warnings
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::fetch::{FetchError, FetchedPage, MemoryFetcher, PageFetcher};
    use crate::models::{MetricType, NewHarvestJob, NewSourcePolicy};
    use crate::ops::telemetry::tests::job;
    use crate::rate_limit::{DomainThrottle, ThrottleConfig};
    use crate::repository::test_pool;
    use crate::scheduler::RetryPolicy;

    const GIMLET: &str = r#"<html><head><title>Gimlet</title>
        <script type="application/ld+json">{"@type":"Recipe","name":"Gimlet",
          "recipeIngredient":["2 oz gin","0.75 oz lime juice","0.75 oz simple syrup"],
          "recipeInstructions":["Shake with ice.","Strain into a coupe."]}</script></head>
        <body><h1>Gimlet</h1><h2>Ingredients</h2><h2>Instructions</h2></body></html>"#;

    async fn sweeper() -> (tempfile::TempDir, Arc<MemoryFetcher>, Sweeper) {
        let (dir, pool) = test_pool().await;
        let jobs = JobRepository::new(pool.clone());
        let policies = PolicyRepository::new(pool);
        let mut policy = NewSourcePolicy::new("Example", "example.com", MetricType::Pervasiveness);
        policy.respect_robots = false;
        policy.seed_urls = vec!["https://example.com/recipes/gimlet".to_string()];
        policies.create(policy).await.unwrap();

        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://example.com/recipes/gimlet", GIMLET);
        fetcher.insert_rate_limited("https://example.com/recipes/busy", 30);
        let runner = Arc::new(JobRunner::new(
            jobs.clone(),
            policies.clone(),
            fetcher.clone(),
            RetryPolicy::default(),
        ));
        let harvester = Arc::new(AutoHarvester::new(
            jobs.clone(),
            policies.clone(),
            fetcher.clone(),
            RetryPolicy::default(),
        ));
        (dir, fetcher, Sweeper::new(runner, harvester, jobs, policies, 3))
    }

    #[tokio::test]
    async fn test_sweep_counts_outcomes() {
        let (_dir, _fetcher, sweeper) = sweeper().await;
        for url in [
            "https://example.com/recipes/gimlet",
            "https://example.com/recipes/missing",
            "https://example.com/recipes/busy",
        ] {
            sweeper.jobs.create(&NewHarvestJob::web(url)).await.unwrap();
        }

        let report = sweeper.sweep_jobs(Utc::now(), 10).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                claimed: 2,
                succeeded: 1,
                failed: 1,
                deferred: 1,
                skipped: 0,
            }
        );

        // Retries and deferrals lie in the future, so nothing is runnable.
        assert!(sweeper.runnable_jobs(Utc::now(), 10).await.unwrap().is_empty());
        assert_eq!(sweeper.sweep_jobs(Utc::now(), 10).await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_interrupted_run_is_swept_again() {
        let (_dir, _fetcher, sweeper) = sweeper().await;
        let job = sweeper
            .jobs
            .create(&NewHarvestJob::web("https://example.com/recipes/gimlet"))
            .await
            .unwrap();
        let claimed_at = Utc::now();
        sweeper.jobs.claim(&job.id, claimed_at, 3).await.unwrap().unwrap();
        assert!(sweeper.runnable_jobs(claimed_at, 10).await.unwrap().is_empty());

        // A restarted scheduler a day later finds the abandoned run.
        let later = claimed_at + chrono::Duration::hours(24);
        let runnable = sweeper.runnable_jobs(later, 10).await.unwrap();
        assert_eq!(runnable.len(), 1);
        assert_eq!(runnable[0].id, job.id);
        assert_eq!(runnable[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_policy_sweep_respects_interval() {
        let (_dir, _fetcher, sweeper) = sweeper().await;
        let now = Utc::now();
        let report = sweeper.sweep_policies(now).await.unwrap();
        assert_eq!(report.policies, 1);
        assert_eq!(report.seeds, 1);
        assert_eq!(report.queued, 1);

        let report = sweeper.sweep_policies(now + chrono::Duration::minutes(5)).await.unwrap();
        assert_eq!(report.policies, 0);
    }

    /// Fetches through a real domain throttle. Pages on `slow_domain` take
    /// `slow` to arrive.
    struct ThrottledFetcher {
        throttle: DomainThrottle,
        pages: MemoryFetcher,
        slow_domain: &'static str,
        slow: Duration,
        started: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait]
    impl PageFetcher for ThrottledFetcher {
        async fn get(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
            let permit = self.throttle.acquire(url).await?;
            self.started
                .lock()
                .unwrap()
                .push((url.to_string(), Instant::now()));
            if permit.domain() == self.slow_domain {
                tokio::time::sleep(self.slow).await;
            }
            self.pages.get(url).await
        }
    }

    #[tokio::test]
    async fn test_slow_domain_does_not_hold_other_domains() {
        let (_dir, pool) = test_pool().await;
        let jobs = JobRepository::new(pool.clone());
        let policies = PolicyRepository::new(pool);
        for domain in ["slowbar.com", "quickbar.com"] {
            let mut policy = NewSourcePolicy::new(domain, domain, MetricType::Pervasiveness);
            policy.respect_robots = false;
            policies.create(policy).await.unwrap();
        }

        let pages = MemoryFetcher::new();
        let mut urls: Vec<String> = (1..=3)
            .map(|n| format!("https://slowbar.com/recipes/gimlet-{}", n))
            .collect();
        urls.push("https://quickbar.com/recipes/gimlet".to_string());
        for url in &urls {
            pages.insert(url, GIMLET);
            jobs.create(&NewHarvestJob::web(url)).await.unwrap();
        }

        let slow = Duration::from_millis(400);
        let fetcher = Arc::new(ThrottledFetcher {
            throttle: DomainThrottle::new(ThrottleConfig {
                base_delay: Duration::from_millis(1),
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                max_concurrent_per_domain: 1,
                ..Default::default()
            }),
            pages,
            slow_domain: "slowbar.com",
            slow,
            started: Mutex::new(Vec::new()),
        });
        let runner = Arc::new(JobRunner::new(
            jobs.clone(),
            policies.clone(),
            fetcher.clone(),
            RetryPolicy::default(),
        ));
        let harvester = Arc::new(AutoHarvester::new(
            jobs.clone(),
            policies.clone(),
            fetcher.clone(),
            RetryPolicy::default(),
        ));
        let sweeper = Sweeper::new(runner, harvester, jobs, policies, 2).with_per_domain(1);

        let start = Instant::now();
        let report = sweeper.sweep_jobs(Utc::now(), 10).await.unwrap();
        assert_eq!(report.claimed, 4);
        assert_eq!(report.succeeded, 4);

        let started = fetcher.started.lock().unwrap().clone();
        let quick = started
            .iter()
            .find(|(url, _)| url.contains("quickbar.com"))
            .map(|(_, at)| at.duration_since(start))
            .unwrap();
        assert!(quick < Duration::from_millis(300), "quickbar.com waited {:?}", quick);

        // One at a time on the slow domain.
        assert!(start.elapsed() >= slow * 3);
        let stats = fetcher.throttle.stats().await;
        assert_eq!(stats["slowbar.com"].total_requests, 3);
        assert_eq!(stats["quickbar.com"].total_requests, 1);
    }

    #[test]
    fn test_domain_queues_keep_order() {
        let urls = [
            "https://a.com/recipes/1",
            "https://b.com/recipes/1",
            "https://www.a.com/recipes/2",
        ];
        let jobs: Vec<HarvestJob> = urls
            .iter()
            .map(|url| job(url, JobStatus::Pending, 0, None))
            .collect();
        let queues = domain_queues(jobs);
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].len(), 2);
        assert_eq!(queues[0][1].source_url, "https://www.a.com/recipes/2");
        assert_eq!(queues[1][0].source_url, "https://b.com/recipes/1");
    }
}
