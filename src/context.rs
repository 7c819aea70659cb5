//! Wiring of repositories and services from resolved settings.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::{HarvestError, Result};
use crate::fetch::{HttpClient, PageFetcher};
use crate::ops::OpsService;
use crate::rate_limit::DomainThrottle;
use crate::repository::{DbPool, JobRepository, PolicyRepository};
use crate::scheduler::{AutoHarvester, JobRunner, Sweeper};

/// Everything a command or the server needs, built once.
#[derive(Clone)]
pub struct HarvestContext {
    pub settings: Settings,
    pub jobs: JobRepository,
    pub policies: PolicyRepository,
    pub runner: Arc<JobRunner>,
    pub harvester: Arc<AutoHarvester>,
    pub ops: OpsService,
}

impl HarvestContext {
    /// Context over the configured database with the real HTTP client.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let throttle = Arc::new(DomainThrottle::new(settings.throttle.clone()));
        let client = HttpClient::from_settings(settings, throttle)
            .map_err(|e| HarvestError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self::with_fetcher(settings, Arc::new(client)))
    }

    pub fn with_fetcher(settings: &Settings, fetcher: Arc<dyn PageFetcher>) -> Self {
        let pool = DbPool::new(&settings.database_url());
        let jobs = JobRepository::new(pool.clone());
        let policies = PolicyRepository::new(pool);
        let runner = Arc::new(JobRunner::new(
            jobs.clone(),
            policies.clone(),
            fetcher.clone(),
            settings.retry,
        ));
        let harvester = Arc::new(AutoHarvester::new(
            jobs.clone(),
            policies.clone(),
            fetcher,
            settings.retry,
        ));
        let ops = OpsService::new(
            jobs.clone(),
            policies.clone(),
            settings.retry.max_attempts,
            settings.telemetry_window_jobs,
        );
        Self {
            settings: settings.clone(),
            jobs,
            policies,
            runner,
            harvester,
            ops,
        }
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.runner.clone(),
            self.harvester.clone(),
            self.jobs.clone(),
            self.policies.clone(),
            self.settings.workers,
        )
        .with_per_domain(self.settings.throttle.max_concurrent_per_domain)
    }
}
