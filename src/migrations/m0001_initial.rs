use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE source_policies (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    domain TEXT NOT NULL UNIQUE,
    metric_type TEXT NOT NULL DEFAULT 'ratings',
    min_rating_count INTEGER NOT NULL DEFAULT 0,
    min_rating_value REAL NOT NULL DEFAULT 0,
    review_policy TEXT NOT NULL DEFAULT 'manual',
    is_active BOOLEAN NOT NULL DEFAULT 1,
    seed_urls TEXT NOT NULL DEFAULT '[]',
    crawl_depth INTEGER NOT NULL DEFAULT 2,
    max_pages INTEGER NOT NULL DEFAULT 40,
    max_recipes INTEGER NOT NULL DEFAULT 20,
    crawl_interval_minutes INTEGER NOT NULL DEFAULT 240,
    respect_robots BOOLEAN NOT NULL DEFAULT 1,
    retry_compliance_failures BOOLEAN NOT NULL DEFAULT 0,
    parser_settings TEXT NOT NULL DEFAULT '{}',
    alert_settings TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE source_policies (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    domain TEXT NOT NULL UNIQUE,
    metric_type TEXT NOT NULL DEFAULT 'ratings',
    min_rating_count BIGINT NOT NULL DEFAULT 0,
    min_rating_value DOUBLE PRECISION NOT NULL DEFAULT 0,
    review_policy TEXT NOT NULL DEFAULT 'manual',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    seed_urls TEXT NOT NULL DEFAULT '[]',
    crawl_depth INTEGER NOT NULL DEFAULT 2,
    max_pages INTEGER NOT NULL DEFAULT 40,
    max_recipes INTEGER NOT NULL DEFAULT 20,
    crawl_interval_minutes INTEGER NOT NULL DEFAULT 240,
    respect_robots BOOLEAN NOT NULL DEFAULT TRUE,
    retry_compliance_failures BOOLEAN NOT NULL DEFAULT FALSE,
    parser_settings TEXT NOT NULL DEFAULT '{}',
    alert_settings TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE harvest_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    source_url TEXT NOT NULL,
    source_type TEXT NOT NULL DEFAULT 'web',
    raw_text TEXT,
    canonical_name TEXT,
    author TEXT,
    rating_value REAL,
    rating_count INTEGER,
    like_count INTEGER,
    share_count INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    next_retry_at TEXT,
    parse_strategy TEXT,
    compliance_reasons TEXT,
    extraction_confidence REAL,
    candidate TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE harvest_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    source_url TEXT NOT NULL,
    source_type TEXT NOT NULL DEFAULT 'web',
    raw_text TEXT,
    canonical_name TEXT,
    author TEXT,
    rating_value DOUBLE PRECISION,
    rating_count BIGINT,
    like_count BIGINT,
    share_count BIGINT,
    status TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    next_retry_at TEXT,
    parse_strategy TEXT,
    compliance_reasons TEXT,
    extraction_confidence DOUBLE PRECISION,
    candidate TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE INDEX idx_harvest_jobs_status_created ON harvest_jobs(status, created_at);
CREATE INDEX idx_harvest_jobs_source_url ON harvest_jobs(source_url);
CREATE INDEX idx_harvest_jobs_next_retry ON harvest_jobs(next_retry_at)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE INDEX idx_harvest_jobs_status_created ON harvest_jobs(status, created_at);
CREATE INDEX idx_harvest_jobs_source_url ON harvest_jobs(source_url);
CREATE INDEX idx_harvest_jobs_next_retry ON harvest_jobs(next_retry_at) WHERE next_retry_at IS NOT NULL"#,
                ),
        )
}
