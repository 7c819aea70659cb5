//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM over SQLite through diesel-async's
//! sync connection wrapper.

pub mod diesel_models;
pub mod job;
pub mod migrations;
pub mod policy;
pub mod pool;
pub mod util;

pub use job::{JobOutcome, JobRepository};
pub use policy::PolicyRepository;
pub use pool::{DbError, DbPool};

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage. Fixed width so text comparison in SQL
/// orders the same as time.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Open a migrated database under a fresh temporary directory.
#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("harvest.db").display());
    migrations::run_migrations(&url).await.unwrap();
    (dir, DbPool::new(&url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_text_orders_like_time() {
        let a = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = a + chrono::Duration::milliseconds(5);
        assert!(format_datetime(a) < format_datetime(b));
        assert_eq!(parse_datetime(&format_datetime(b)), b);
        assert_eq!(parse_datetime("garbage"), DateTime::UNIX_EPOCH);
    }
}
