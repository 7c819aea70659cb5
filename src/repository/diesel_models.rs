//! Diesel ORM models for database tables.
//!
//! JSON columns are stored as text and decoded in the repositories.

use diesel::prelude::*;

use crate::schema;

/// Source policy record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::source_policies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PolicyRecord {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub metric_type: String,
    pub min_rating_count: i64,
    pub min_rating_value: f64,
    pub review_policy: String,
    pub is_active: bool,
    pub seed_urls: String,
    pub crawl_depth: i32,
    pub max_pages: i32,
    pub max_recipes: i32,
    pub crawl_interval_minutes: i32,
    pub respect_robots: bool,
    pub retry_compliance_failures: bool,
    pub parser_settings: String,
    pub alert_settings: String,
    pub last_swept_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Policy row for insertion and full-row updates.
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::source_policies)]
#[diesel(treat_none_as_null = true)]
pub struct PolicyRow<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub domain: &'a str,
    pub metric_type: &'a str,
    pub min_rating_count: i64,
    pub min_rating_value: f64,
    pub review_policy: &'a str,
    pub is_active: bool,
    pub seed_urls: String,
    pub crawl_depth: i32,
    pub max_pages: i32,
    pub max_recipes: i32,
    pub crawl_interval_minutes: i32,
    pub respect_robots: bool,
    pub retry_compliance_failures: bool,
    pub parser_settings: String,
    pub alert_settings: String,
    pub last_swept_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Harvest job record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::harvest_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRecord {
    pub id: String,
    pub source_url: String,
    pub source_type: String,
    pub raw_text: Option<String>,
    pub canonical_name: Option<String>,
    pub author: Option<String>,
    pub rating_value: Option<f64>,
    pub rating_count: Option<i64>,
    pub like_count: Option<i64>,
    pub share_count: Option<i64>,
    pub status: String,
    pub error: Option<String>,
    pub attempt_count: i32,
    pub last_attempt_at: Option<String>,
    pub next_retry_at: Option<String>,
    pub deferred_until: Option<String>,
    pub parse_strategy: Option<String>,
    pub compliance_reasons: Option<String>,
    pub extraction_confidence: Option<f64>,
    pub candidate: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New job for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::harvest_jobs)]
pub struct NewJobRow<'a> {
    pub id: &'a str,
    pub source_url: &'a str,
    pub source_type: &'a str,
    pub raw_text: Option<&'a str>,
    pub canonical_name: Option<&'a str>,
    pub author: Option<&'a str>,
    pub rating_value: Option<f64>,
    pub rating_count: Option<i64>,
    pub like_count: Option<i64>,
    pub share_count: Option<i64>,
    pub status: &'a str,
    pub attempt_count: i32,
    pub parse_strategy: Option<String>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Outcome columns written when a run finishes.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::harvest_jobs)]
#[diesel(treat_none_as_null = true)]
pub struct JobOutcomeChangeset {
    pub status: String,
    pub error: Option<String>,
    pub attempt_count: i32,
    pub next_retry_at: Option<String>,
    pub parse_strategy: Option<String>,
    pub compliance_reasons: Option<String>,
    pub extraction_confidence: Option<f64>,
    pub candidate: Option<String>,
    pub canonical_name: Option<String>,
    pub author: Option<String>,
    pub rating_value: Option<f64>,
    pub rating_count: Option<i64>,
    pub like_count: Option<i64>,
    pub share_count: Option<i64>,
    pub updated_at: String,
}
