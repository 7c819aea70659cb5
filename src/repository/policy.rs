//! Source policy repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::diesel_models::{PolicyRecord, PolicyRow};
use super::pool::{DbError, DbPool};
use super::util::{from_json, to_json};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::{MetricType, NewSourcePolicy, ReviewPolicy, SettingsMap, SourcePolicy};
use crate::schema::source_policies;
use crate::with_conn;

impl TryFrom<PolicyRecord> for SourcePolicy {
    type Error = DbError;

    fn try_from(record: PolicyRecord) -> Result<Self, Self::Error> {
        Ok(SourcePolicy {
            metric_type: MetricType::from_str(&record.metric_type).unwrap_or(MetricType::Ratings),
            review_policy: ReviewPolicy::from_str(&record.review_policy)
                .unwrap_or(ReviewPolicy::Manual),
            seed_urls: from_json(&record.seed_urls)?,
            parser_settings: from_json(&record.parser_settings)?,
            alert_settings: from_json(&record.alert_settings)?,
            last_swept_at: parse_datetime_opt(record.last_swept_at),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            name: record.name,
            domain: record.domain,
            min_rating_count: record.min_rating_count,
            min_rating_value: record.min_rating_value,
            is_active: record.is_active,
            crawl_depth: record.crawl_depth,
            max_pages: record.max_pages,
            max_recipes: record.max_recipes,
            crawl_interval_minutes: record.crawl_interval_minutes,
            respect_robots: record.respect_robots,
            retry_compliance_failures: record.retry_compliance_failures,
        })
    }
}

fn to_row(policy: &SourcePolicy) -> Result<PolicyRow<'_>, DbError> {
    Ok(PolicyRow {
        id: &policy.id,
        name: &policy.name,
        domain: &policy.domain,
        metric_type: policy.metric_type.as_str(),
        min_rating_count: policy.min_rating_count,
        min_rating_value: policy.min_rating_value,
        review_policy: policy.review_policy.as_str(),
        is_active: policy.is_active,
        seed_urls: to_json(&policy.seed_urls)?,
        crawl_depth: policy.crawl_depth,
        max_pages: policy.max_pages,
        max_recipes: policy.max_recipes,
        crawl_interval_minutes: policy.crawl_interval_minutes,
        respect_robots: policy.respect_robots,
        retry_compliance_failures: policy.retry_compliance_failures,
        parser_settings: to_json(&policy.parser_settings)?,
        alert_settings: to_json(&policy.alert_settings)?,
        last_swept_at: policy.last_swept_at.map(format_datetime),
        created_at: format_datetime(policy.created_at),
        updated_at: format_datetime(policy.updated_at),
    })
}

/// Build the stored form of a validated new policy.
pub fn materialize(new: NewSourcePolicy) -> SourcePolicy {
    let now = Utc::now();
    SourcePolicy {
        id: uuid::Uuid::new_v4().to_string(),
        name: new.name,
        domain: new.domain,
        metric_type: new.metric_type,
        min_rating_count: new.min_rating_count,
        min_rating_value: new.min_rating_value,
        review_policy: new.review_policy,
        is_active: new.is_active,
        seed_urls: new.seed_urls,
        crawl_depth: new.crawl_depth,
        max_pages: new.max_pages,
        max_recipes: new.max_recipes,
        crawl_interval_minutes: new.crawl_interval_minutes,
        respect_robots: new.respect_robots,
        retry_compliance_failures: new.retry_compliance_failures,
        parser_settings: new.parser_settings,
        alert_settings: new.alert_settings,
        last_swept_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Diesel-backed source policy repository.
#[derive(Clone)]
pub struct PolicyRepository {
    pool: DbPool,
}

impl PolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a validated policy.
    pub async fn create(&self, new: NewSourcePolicy) -> Result<SourcePolicy, DbError> {
        let policy = materialize(new);
        let row = to_row(&policy)?;
        with_conn!(self.pool, conn => {
            diesel::insert_into(source_policies::table)
                .values(&row)
                .execute(&mut conn)
                .await?;
        });
        Ok(policy)
    }

    /// Insert policies whose domain is not already present. Returns the
    /// number inserted.
    pub async fn install_defaults(&self, defaults: Vec<NewSourcePolicy>) -> Result<usize, DbError> {
        let policies: Vec<SourcePolicy> = defaults.into_iter().map(materialize).collect();
        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for policy in &policies {
                        let row = to_row(policy)?;
                        inserted += diesel::insert_or_ignore_into(source_policies::table)
                            .values(&row)
                            .execute(conn)
                            .await?;
                    }
                    Ok::<usize, DbError>(inserted)
                })
            })
            .await
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<SourcePolicy>, DbError> {
        with_conn!(self.pool, conn => {
            source_policies::table
                .find(id)
                .select(PolicyRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(SourcePolicy::try_from).transpose())
        })
    }

    pub async fn get_by_domain(&self, domain: &str) -> Result<Option<SourcePolicy>, DbError> {
        let domain = domain.trim().to_lowercase();
        with_conn!(self.pool, conn => {
            source_policies::table
                .filter(source_policies::domain.eq(&domain))
                .select(PolicyRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(SourcePolicy::try_from).transpose())
        })
    }

    /// All policies ordered by domain.
    pub async fn list(&self) -> Result<Vec<SourcePolicy>, DbError> {
        with_conn!(self.pool, conn => {
            source_policies::table
                .order(source_policies::domain.asc())
                .select(PolicyRecord::as_select())
                .load(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(SourcePolicy::try_from).collect())
        })
    }

    pub async fn list_active(&self) -> Result<Vec<SourcePolicy>, DbError> {
        with_conn!(self.pool, conn => {
            source_policies::table
                .filter(source_policies::is_active.eq(true))
                .order(source_policies::domain.asc())
                .select(PolicyRecord::as_select())
                .load(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(SourcePolicy::try_from).collect())
        })
    }

    /// Write every mutable column of an existing policy.
    pub async fn update(&self, policy: &SourcePolicy) -> Result<bool, DbError> {
        let row = to_row(policy)?;
        with_conn!(self.pool, conn => {
            let rows = diesel::update(source_policies::table.find(&policy.id))
                .set(&row)
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    pub async fn set_parser_settings(
        &self,
        id: &str,
        settings: &SettingsMap,
    ) -> Result<bool, DbError> {
        let json = to_json(settings)?;
        let now = format_datetime(Utc::now());
        with_conn!(self.pool, conn => {
            let rows = diesel::update(source_policies::table.find(id))
                .set((
                    source_policies::parser_settings.eq(&json),
                    source_policies::updated_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    pub async fn set_alert_settings(
        &self,
        id: &str,
        settings: &SettingsMap,
    ) -> Result<bool, DbError> {
        let json = to_json(settings)?;
        let now = format_datetime(Utc::now());
        with_conn!(self.pool, conn => {
            let rows = diesel::update(source_policies::table.find(id))
                .set((
                    source_policies::alert_settings.eq(&json),
                    source_policies::updated_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    /// Record that a policy sweep ran.
    pub async fn mark_swept(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        let ts = format_datetime(at);
        with_conn!(self.pool, conn => {
            diesel::update(source_policies::table.find(id))
                .set(source_policies::last_swept_at.eq(Some(&ts)))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DbError> {
        with_conn!(self.pool, conn => {
            let rows = diesel::delete(source_policies::table.find(id))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_policies;
    use crate::repository::test_pool;

    #[tokio::test]
    async fn test_policy_crud() {
        let (_dir, pool) = test_pool().await;
        let repo = PolicyRepository::new(pool);

        let mut new = NewSourcePolicy::new("Punch", "punchdrink.com", MetricType::Pervasiveness);
        new.seed_urls = vec!["https://punchdrink.com/".to_string()];
        let created = repo.create(new).await.unwrap();

        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.domain, "punchdrink.com");
        assert_eq!(fetched.seed_urls, vec!["https://punchdrink.com/"]);
        assert!(fetched.respect_robots);

        let mut settings = SettingsMap::new();
        settings.insert("enable_jsonld".to_string(), serde_json::Value::Bool(false));
        assert!(repo.set_parser_settings(&created.id, &settings).await.unwrap());
        let by_domain = repo.get_by_domain("PunchDrink.com").await.unwrap().unwrap();
        assert_eq!(by_domain.parser_settings["enable_jsonld"], false);

        let mut edited = by_domain.clone();
        edited.is_active = false;
        assert!(repo.update(&edited).await.unwrap());
        assert!(repo.list_active().await.unwrap().is_empty());
        assert_eq!(repo.list().await.unwrap().len(), 1);

        assert!(repo.delete(&created.id).await.unwrap());
        assert!(repo.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_defaults_once() {
        let (_dir, pool) = test_pool().await;
        let repo = PolicyRepository::new(pool);

        assert_eq!(repo.install_defaults(default_policies()).await.unwrap(), 6);
        assert_eq!(repo.install_defaults(default_policies()).await.unwrap(), 0);
        let punch = repo.get_by_domain("punchdrink.com").await.unwrap().unwrap();
        assert_eq!(punch.parser_settings["min_extraction_confidence"], 0.3);
    }

    #[tokio::test]
    async fn test_mark_swept() {
        let (_dir, pool) = test_pool().await;
        let repo = PolicyRepository::new(pool);
        let created = repo
            .create(NewSourcePolicy::new("Food", "food.com", MetricType::Ratings))
            .await
            .unwrap();
        let now = Utc::now();
        repo.mark_swept(&created.id, now).await.unwrap();
        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert!(!fetched.is_sweep_due(now));
    }
}
