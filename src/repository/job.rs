//! Harvest job repository.
//!
//! Status transitions that must not race (claim, finish, defer) are single
//! conditional UPDATE statements; callers learn whether they won from the
//! affected row count.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::diesel_models::{JobOutcomeChangeset, JobRecord, NewJobRow};
use super::pool::{DbError, DbPool};
use super::util::{from_json, to_json};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::{
    HarvestJob, JobStatus, NewHarvestJob, ParseStrategy, ParsedRecipe, Signals, SourceType,
};
use crate::schema::harvest_jobs;
use crate::with_conn;

/// Error recorded on a job whose run never wrote an outcome.
pub const INTERRUPTED_ERROR: &str = "Run interrupted before completion";

impl TryFrom<JobRecord> for HarvestJob {
    type Error = DbError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        let compliance_reasons = record
            .compliance_reasons
            .as_deref()
            .map(from_json::<Vec<String>>)
            .transpose()?;
        let candidate = record
            .candidate
            .as_deref()
            .map(from_json::<ParsedRecipe>)
            .transpose()?;

        Ok(HarvestJob {
            source_type: SourceType::from_str(&record.source_type).unwrap_or(SourceType::Web),
            signals: Signals {
                rating_value: record.rating_value,
                rating_count: record.rating_count,
                like_count: record.like_count,
                share_count: record.share_count,
            },
            status: JobStatus::from_str(&record.status).unwrap_or(JobStatus::Failed),
            last_attempt_at: parse_datetime_opt(record.last_attempt_at),
            next_retry_at: parse_datetime_opt(record.next_retry_at),
            deferred_until: parse_datetime_opt(record.deferred_until),
            parse_strategy: record.parse_strategy.map(ParseStrategy::from),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            compliance_reasons,
            candidate,
            id: record.id,
            source_url: record.source_url,
            raw_text: record.raw_text,
            canonical_name: record.canonical_name,
            author: record.author,
            error: record.error,
            attempt_count: record.attempt_count,
            extraction_confidence: record.extraction_confidence,
        })
    }
}

/// Result of one run, written atomically when the run finishes.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub error: Option<String>,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub parse_strategy: Option<ParseStrategy>,
    pub compliance_reasons: Option<Vec<String>>,
    pub candidate: Option<ParsedRecipe>,
    /// Values kept from the job when no candidate was produced.
    pub canonical_name: Option<String>,
    pub author: Option<String>,
    pub signals: Signals,
}

impl JobOutcome {
    fn changeset(&self, now: DateTime<Utc>) -> Result<JobOutcomeChangeset, DbError> {
        let candidate = self.candidate.as_ref().map(to_json).transpose()?;
        let compliance_reasons = self.compliance_reasons.as_ref().map(to_json).transpose()?;
        let (canonical_name, author, signals) = match &self.candidate {
            Some(recipe) => (
                Some(recipe.canonical_name.clone()),
                recipe.author.clone().or_else(|| self.author.clone()),
                recipe.signals.or(self.signals),
            ),
            None => (self.canonical_name.clone(), self.author.clone(), self.signals),
        };
        Ok(JobOutcomeChangeset {
            status: self.status.as_str().to_string(),
            error: self.error.clone(),
            attempt_count: self.attempt_count,
            next_retry_at: self.next_retry_at.map(format_datetime),
            parse_strategy: self.parse_strategy.as_ref().map(|s| s.to_string()),
            compliance_reasons,
            extraction_confidence: self.candidate.as_ref().map(|c| c.extraction_confidence),
            candidate,
            canonical_name,
            author,
            rating_value: signals.rating_value,
            rating_count: signals.rating_count,
            like_count: signals.like_count,
            share_count: signals.share_count,
            updated_at: format_datetime(now),
        })
    }
}

/// Diesel-backed harvest job repository.
#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a pending job.
    pub async fn create(&self, new: &NewHarvestJob) -> Result<HarvestJob, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_datetime(Utc::now());
        let row = NewJobRow {
            id: &id,
            source_url: &new.source_url,
            source_type: new.source_type.as_str(),
            raw_text: new.raw_text.as_deref(),
            canonical_name: new.canonical_name.as_deref(),
            author: new.author.as_deref(),
            rating_value: new.signals.rating_value,
            rating_count: new.signals.rating_count,
            like_count: new.signals.like_count,
            share_count: new.signals.share_count,
            status: JobStatus::Pending.as_str(),
            attempt_count: 0,
            parse_strategy: new.parse_strategy.as_ref().map(|s| s.to_string()),
            created_at: &now,
            updated_at: &now,
        };
        with_conn!(self.pool, conn => {
            diesel::insert_into(harvest_jobs::table)
                .values(&row)
                .execute(&mut conn)
                .await?;
            harvest_jobs::table
                .find(&id)
                .select(JobRecord::as_select())
                .first(&mut conn)
                .await
                .and_then(HarvestJob::try_from)
        })
    }

    /// Insert a job that already has a final outcome (a rejection observed
    /// during discovery).
    pub async fn record(
        &self,
        new: &NewHarvestJob,
        outcome: &JobOutcome,
    ) -> Result<HarvestJob, DbError> {
        let job = self.create(new).await?;
        let now = Utc::now();
        let changes = outcome.changeset(now)?;
        let attempted = format_datetime(now);
        with_conn!(self.pool, conn => {
            diesel::update(harvest_jobs::table.find(&job.id))
                .set((&changes, harvest_jobs::last_attempt_at.eq(Some(&attempted))))
                .execute(&mut conn)
                .await?;
            harvest_jobs::table
                .find(&job.id)
                .select(JobRecord::as_select())
                .first(&mut conn)
                .await
                .and_then(HarvestJob::try_from)
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<HarvestJob>, DbError> {
        with_conn!(self.pool, conn => {
            harvest_jobs::table
                .find(id)
                .select(JobRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(HarvestJob::try_from).transpose())
        })
    }

    /// Jobs newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<HarvestJob>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = harvest_jobs::table
                .select(JobRecord::as_select())
                .order(harvest_jobs::created_at.desc())
                .limit(limit)
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(harvest_jobs::status.eq(status.as_str()));
            }
            query
                .load(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(HarvestJob::try_from).collect())
        })
    }

    /// Pending jobs not under a throttle deferral, oldest first.
    pub async fn list_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<HarvestJob>, DbError> {
        let now = format_datetime(now);
        with_conn!(self.pool, conn => {
            harvest_jobs::table
                .filter(harvest_jobs::status.eq(JobStatus::Pending.as_str()))
                .filter(
                    harvest_jobs::deferred_until
                        .is_null()
                        .or(harvest_jobs::deferred_until.le(&now)),
                )
                .order(harvest_jobs::created_at.asc())
                .limit(limit)
                .select(JobRecord::as_select())
                .load(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(HarvestJob::try_from).collect())
        })
    }

    /// Failed jobs with retry budget left whose retry time has come,
    /// least recently updated first.
    pub async fn list_retryable(
        &self,
        now: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<HarvestJob>, DbError> {
        let now = format_datetime(now);
        with_conn!(self.pool, conn => {
            harvest_jobs::table
                .filter(harvest_jobs::status.eq(JobStatus::Failed.as_str()))
                .filter(harvest_jobs::attempt_count.lt(max_attempts))
                .filter(harvest_jobs::next_retry_at.is_not_null())
                .filter(harvest_jobs::next_retry_at.le(&now))
                .filter(
                    harvest_jobs::deferred_until
                        .is_null()
                        .or(harvest_jobs::deferred_until.le(&now)),
                )
                .order(harvest_jobs::updated_at.asc())
                .limit(limit)
                .select(JobRecord::as_select())
                .load(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(HarvestJob::try_from).collect())
        })
    }

    /// Most recent jobs for telemetry, optionally since a timestamp.
    pub async fn recent(
        &self,
        limit: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<HarvestJob>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = harvest_jobs::table
                .select(JobRecord::as_select())
                .order(harvest_jobs::created_at.desc())
                .limit(limit)
                .into_boxed();
            if let Some(since) = since {
                query = query.filter(harvest_jobs::created_at.ge(format_datetime(since)));
            }
            query
                .load(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(HarvestJob::try_from).collect())
        })
    }

    /// Whether a pending job, or a running one whose claim has not expired,
    /// already targets this URL.
    pub async fn exists_active_for_url(
        &self,
        url: &str,
        lease_expiry: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        use diesel::dsl::count_star;
        let expiry = format_datetime(lease_expiry);
        with_conn!(self.pool, conn => {
            let count: i64 = harvest_jobs::table
                .filter(harvest_jobs::source_url.eq(url))
                .filter(
                    harvest_jobs::status.eq(JobStatus::Pending.as_str()).or(harvest_jobs::status
                        .eq(JobStatus::Running.as_str())
                        .and(harvest_jobs::last_attempt_at.gt(&expiry))),
                )
                .select(count_star())
                .first(&mut conn)
                .await?;
            Ok(count > 0)
        })
    }

    /// Hand runs whose claim expired back to the retry schedule.
    ///
    /// A job stuck in `running` was interrupted between claim and outcome
    /// (crash, abort, failed write). It becomes `failed`, due at once while
    /// it has attempts left and terminal otherwise. Returns how many jobs
    /// were released.
    pub async fn release_expired(
        &self,
        now: DateTime<Utc>,
        lease_expiry: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<usize, DbError> {
        let ts = format_datetime(now);
        let expiry = format_datetime(lease_expiry);
        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let expired = harvest_jobs::status
                        .eq(JobStatus::Running.as_str())
                        .and(
                            harvest_jobs::last_attempt_at
                                .is_null()
                                .or(harvest_jobs::last_attempt_at.le(&expiry)),
                        );
                    let retried = diesel::update(
                        harvest_jobs::table
                            .filter(expired.clone())
                            .filter(harvest_jobs::attempt_count.lt(max_attempts)),
                    )
                    .set((
                        harvest_jobs::status.eq(JobStatus::Failed.as_str()),
                        harvest_jobs::error.eq(Some(INTERRUPTED_ERROR)),
                        harvest_jobs::next_retry_at.eq(Some(&ts)),
                        harvest_jobs::updated_at.eq(&ts),
                    ))
                    .execute(conn)
                    .await?;
                    let exhausted = diesel::update(harvest_jobs::table.filter(expired))
                        .set((
                            harvest_jobs::status.eq(JobStatus::Failed.as_str()),
                            harvest_jobs::error.eq(Some(INTERRUPTED_ERROR)),
                            harvest_jobs::next_retry_at.eq(None::<String>),
                            harvest_jobs::updated_at.eq(&ts),
                        ))
                        .execute(conn)
                        .await?;
                    Ok::<usize, DbError>(retried + exhausted)
                })
            })
            .await
        })
    }

    /// Atomically move a runnable job to `running`, consuming one attempt.
    ///
    /// Returns `None` when another runner holds the job or it is not
    /// runnable at `now`.
    pub async fn claim(
        &self,
        id: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Option<HarvestJob>, DbError> {
        let ts = format_datetime(now);
        with_conn!(self.pool, conn => {
            let claimed = conn
                .transaction(|conn| {
                    Box::pin(async move {
                        let rows = diesel::update(
                            harvest_jobs::table
                                .filter(harvest_jobs::id.eq(id))
                                .filter(harvest_jobs::status.eq_any([
                                    JobStatus::Pending.as_str(),
                                    JobStatus::Failed.as_str(),
                                ]))
                                .filter(harvest_jobs::attempt_count.lt(max_attempts))
                                .filter(
                                    harvest_jobs::next_retry_at
                                        .is_null()
                                        .or(harvest_jobs::next_retry_at.le(&ts)),
                                )
                                .filter(
                                    harvest_jobs::deferred_until
                                        .is_null()
                                        .or(harvest_jobs::deferred_until.le(&ts)),
                                ),
                        )
                        .set((
                            harvest_jobs::status.eq(JobStatus::Running.as_str()),
                            harvest_jobs::error.eq(None::<String>),
                            harvest_jobs::attempt_count.eq(harvest_jobs::attempt_count + 1),
                            harvest_jobs::last_attempt_at.eq(Some(&ts)),
                            harvest_jobs::next_retry_at.eq(None::<String>),
                            harvest_jobs::deferred_until.eq(None::<String>),
                            harvest_jobs::updated_at.eq(&ts),
                        ))
                        .execute(conn)
                        .await?;
                        if rows == 0 {
                            return Ok::<Option<JobRecord>, DbError>(None);
                        }
                        harvest_jobs::table
                            .find(id)
                            .select(JobRecord::as_select())
                            .first(conn)
                            .await
                            .map(Some)
                    })
                })
                .await?;
            claimed.map(HarvestJob::try_from).transpose()
        })
    }

    /// Write the outcome of a run. Only applies while the job is `running`.
    pub async fn finish(
        &self,
        id: &str,
        outcome: &JobOutcome,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let changes = outcome.changeset(now)?;
        with_conn!(self.pool, conn => {
            let rows = diesel::update(
                harvest_jobs::table
                    .filter(harvest_jobs::id.eq(id))
                    .filter(harvest_jobs::status.eq(JobStatus::Running.as_str())),
            )
            .set(&changes)
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    /// Undo a claim after a throttle signal: the job gets back its pre-claim
    /// status, attempt count and retry fields, plus a deferral.
    pub async fn defer(
        &self,
        before: &HarvestJob,
        deferred_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let now = format_datetime(now);
        let last_attempt = before.last_attempt_at.map(format_datetime);
        let next_retry = before.next_retry_at.map(format_datetime);
        let until = format_datetime(deferred_until);
        with_conn!(self.pool, conn => {
            let rows = diesel::update(
                harvest_jobs::table
                    .filter(harvest_jobs::id.eq(&before.id))
                    .filter(harvest_jobs::status.eq(JobStatus::Running.as_str())),
            )
            .set((
                harvest_jobs::status.eq(before.status.as_str()),
                harvest_jobs::error.eq(&before.error),
                harvest_jobs::attempt_count.eq(before.attempt_count),
                harvest_jobs::last_attempt_at.eq(&last_attempt),
                harvest_jobs::next_retry_at.eq(&next_retry),
                harvest_jobs::deferred_until.eq(Some(&until)),
                harvest_jobs::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DbError> {
        with_conn!(self.pool, conn => {
            let rows = diesel::delete(harvest_jobs::table.find(id))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureClass, ParserKind};
    use crate::repository::test_pool;

    fn failed_outcome(attempts: i32, next_retry_at: Option<DateTime<Utc>>) -> JobOutcome {
        JobOutcome {
            status: JobStatus::Failed,
            error: Some("Unable to parse recipe (domain-selector-mismatch)".to_string()),
            attempt_count: attempts,
            next_retry_at,
            parse_strategy: Some(ParseStrategy::parse_failed(
                FailureClass::DomainSelectorMismatch,
            )),
            compliance_reasons: None,
            candidate: None,
            canonical_name: None,
            author: None,
            signals: Signals::default(),
        }
    }

    #[tokio::test]
    async fn test_claim_is_single_flight() {
        let (_dir, pool) = test_pool().await;
        let repo = JobRepository::new(pool);
        let job = repo
            .create(&NewHarvestJob::web("https://www.food.com/recipe/mojito-1"))
            .await
            .unwrap();
        let now = Utc::now();

        let first = repo.claim(&job.id, now, 3).await.unwrap();
        let second = repo.claim(&job.id, now, 3).await.unwrap();
        let claimed = first.expect("first claim wins");
        assert!(second.is_none());
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_retry_window_blocks_claim() {
        let (_dir, pool) = test_pool().await;
        let repo = JobRepository::new(pool);
        let job = repo
            .create(&NewHarvestJob::web("https://www.food.com/recipe/mojito-1"))
            .await
            .unwrap();
        let now = Utc::now();
        let claimed = repo.claim(&job.id, now, 3).await.unwrap().unwrap();
        let retry_at = now + chrono::Duration::seconds(300);
        assert!(repo
            .finish(&claimed.id, &failed_outcome(1, Some(retry_at)), now)
            .await
            .unwrap());

        assert!(repo.claim(&job.id, now, 3).await.unwrap().is_none());
        assert!(repo.list_retryable(now, 3, 10).await.unwrap().is_empty());

        let later = retry_at + chrono::Duration::seconds(1);
        let retryable = repo.list_retryable(later, 3, 10).await.unwrap();
        assert_eq!(retryable.len(), 1);
        assert_eq!(
            retryable[0].parse_strategy.as_ref().map(|s| s.to_string()),
            Some("parse_failed:domain-selector-mismatch".to_string())
        );
        let reclaimed = repo.claim(&job.id, later, 3).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempt_count, 2);
        assert!(reclaimed.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn test_defer_restores_attempts() {
        let (_dir, pool) = test_pool().await;
        let repo = JobRepository::new(pool);
        let job = repo
            .create(&NewHarvestJob::web("https://www.food.com/recipe/mojito-1"))
            .await
            .unwrap();
        let now = Utc::now();
        repo.claim(&job.id, now, 3).await.unwrap().unwrap();

        let until = now + chrono::Duration::seconds(4);
        assert!(repo.defer(&job, until, now).await.unwrap());
        let restored = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(restored.status, JobStatus::Pending);
        assert_eq!(restored.attempt_count, 0);
        assert!(restored.last_attempt_at.is_none());
        assert!(repo.claim(&job.id, now, 3).await.unwrap().is_none());
        assert!(repo.list_pending(now, 10).await.unwrap().is_empty());
        assert!(repo
            .claim(&job.id, until + chrono::Duration::seconds(1), 3)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_active_url_and_listing() {
        let (_dir, pool) = test_pool().await;
        let repo = JobRepository::new(pool);
        let url = "https://punchdrink.com/recipes/negroni/";
        let now = Utc::now();
        let expiry = now - chrono::Duration::seconds(600);
        assert!(!repo.exists_active_for_url(url, expiry).await.unwrap());
        let job = repo.create(&NewHarvestJob::web(url)).await.unwrap();
        assert!(repo.exists_active_for_url(url, expiry).await.unwrap());

        repo.claim(&job.id, now, 3).await.unwrap().unwrap();
        assert!(repo.exists_active_for_url(url, expiry).await.unwrap());
        let recipe = ParsedRecipe {
            canonical_name: "Negroni".to_string(),
            description: None,
            ingredients: vec![],
            instructions: vec!["Stir.".to_string()],
            author: None,
            signals: Signals::default(),
            source_url: url.to_string(),
            tags: vec![],
            parser: ParserKind::JsonLd,
            recovered: false,
            fallback_class: None,
            extraction_confidence: 0.91,
        };
        let outcome = JobOutcome {
            status: JobStatus::Succeeded,
            error: None,
            attempt_count: 1,
            next_retry_at: None,
            parse_strategy: Some(recipe.strategy()),
            compliance_reasons: None,
            candidate: Some(recipe),
            canonical_name: None,
            author: None,
            signals: Signals::default(),
        };
        assert!(repo.finish(&job.id, &outcome, now).await.unwrap());
        assert!(!repo.exists_active_for_url(url, expiry).await.unwrap());

        let done = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(done.canonical_name.as_deref(), Some("Negroni"));
        assert_eq!(done.extraction_confidence, Some(0.91));
        assert_eq!(
            repo.list(Some(JobStatus::Succeeded), 10).await.unwrap().len(),
            1
        );
        assert!(repo.list(Some(JobStatus::Failed), 10).await.unwrap().is_empty());
        assert_eq!(repo.recent(10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_claims_are_released() {
        let (_dir, pool) = test_pool().await;
        let repo = JobRepository::new(pool);
        let url = "https://www.food.com/recipe/daiquiri-9";
        let job = repo.create(&NewHarvestJob::web(url)).await.unwrap();
        let claimed_at = Utc::now();
        repo.claim(&job.id, claimed_at, 3).await.unwrap().unwrap();

        // Lease still held: nothing to release, the URL stays active.
        let soon = claimed_at + chrono::Duration::seconds(60);
        let expiry = soon - chrono::Duration::seconds(600);
        assert_eq!(repo.release_expired(soon, expiry, 3).await.unwrap(), 0);
        assert!(repo.exists_active_for_url(url, expiry).await.unwrap());

        // The process died; a day later the claim has expired.
        let later = claimed_at + chrono::Duration::hours(24);
        let expiry = later - chrono::Duration::seconds(600);
        assert!(!repo.exists_active_for_url(url, expiry).await.unwrap());
        assert_eq!(repo.release_expired(later, expiry, 3).await.unwrap(), 1);

        let released = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(released.status, JobStatus::Failed);
        assert_eq!(released.error.as_deref(), Some(INTERRUPTED_ERROR));
        assert_eq!(released.attempt_count, 1);
        let due = released.next_retry_at.unwrap();
        assert!((due - later).num_milliseconds().abs() <= 1);
        assert_eq!(repo.list_retryable(later, 3, 10).await.unwrap().len(), 1);
        let reclaimed = repo.claim(&job.id, later, 3).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempt_count, 2);
    }

    #[tokio::test]
    async fn test_expired_claim_without_budget_is_terminal() {
        let (_dir, pool) = test_pool().await;
        let repo = JobRepository::new(pool);
        let job = repo
            .create(&NewHarvestJob::web("https://www.food.com/recipe/sour-3"))
            .await
            .unwrap();
        let claimed_at = Utc::now();
        repo.claim(&job.id, claimed_at, 1).await.unwrap().unwrap();

        let later = claimed_at + chrono::Duration::hours(1);
        let expiry = later - chrono::Duration::seconds(600);
        assert_eq!(repo.release_expired(later, expiry, 1).await.unwrap(), 1);
        let released = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(released.status, JobStatus::Failed);
        assert!(released.next_retry_at.is_none());
        assert!(repo.list_retryable(later, 1, 10).await.unwrap().is_empty());
    }
}
