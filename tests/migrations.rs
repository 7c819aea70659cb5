//! Schema tests
//!
//! Applies the cetane migrations to a fresh SQLite database and checks the
//! resulting tables and indexes against what the Diesel schema expects.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, Result as SqliteResult};

/// Column name -> (normalized type, not null)
type Columns = BTreeMap<String, (String, bool)>;

fn extract_columns(conn: &Connection, table: &str) -> SqliteResult<Columns> {
    let mut pragma = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let rows = pragma.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?,
            normalize_type(&row.get::<_, String>(2)?),
            row.get::<_, bool>(3)?,
        ))
    })?;
    let mut columns = BTreeMap::new();
    for row in rows {
        let (name, col_type, not_null) = row?;
        columns.insert(name, (col_type, not_null));
    }
    Ok(columns)
}

/// Index name -> indexed columns
fn extract_indexes(conn: &Connection) -> SqliteResult<BTreeMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='index' AND sql IS NOT NULL ORDER BY name",
    )?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut indexes = BTreeMap::new();
    for name in names {
        let mut pragma = conn.prepare(&format!("PRAGMA index_info(\"{}\")", name))?;
        let columns: Vec<String> = pragma
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<SqliteResult<Vec<_>>>()?;
        indexes.insert(name, columns);
    }
    Ok(indexes)
}

/// SQLite type affinity
fn normalize_type(t: &str) -> String {
    let t = t.to_uppercase();
    if t.contains("INT") {
        return "INTEGER".to_string();
    }
    if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        return "TEXT".to_string();
    }
    if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        return "REAL".to_string();
    }
    if t.contains("BOOL") {
        return "BOOLEAN".to_string();
    }
    t
}

async fn migrated_db() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.db");
    let url = format!("sqlite:{}", path.display());
    let applied = harvest::repository::migrations::run_migrations(&url)
        .await
        .unwrap();
    assert_eq!(applied.len(), 2);
    (dir, path.display().to_string())
}

#[tokio::test]
async fn test_job_table_matches_schema() {
    let (_dir, path) = migrated_db().await;
    let conn = Connection::open(&path).unwrap();
    let columns = extract_columns(&conn, "harvest_jobs").unwrap();

    let expected: BTreeSet<&str> = [
        "id",
        "source_url",
        "source_type",
        "raw_text",
        "canonical_name",
        "author",
        "rating_value",
        "rating_count",
        "like_count",
        "share_count",
        "status",
        "error",
        "attempt_count",
        "last_attempt_at",
        "next_retry_at",
        "deferred_until",
        "parse_strategy",
        "compliance_reasons",
        "extraction_confidence",
        "candidate",
        "created_at",
        "updated_at",
    ]
    .into_iter()
    .collect();
    let actual: BTreeSet<&str> = columns.keys().map(String::as_str).collect();
    assert_eq!(actual, expected);

    assert_eq!(columns["attempt_count"], ("INTEGER".to_string(), true));
    assert_eq!(columns["extraction_confidence"].0, "REAL");
    assert!(!columns["next_retry_at"].1);
    assert!(!columns["deferred_until"].1);
}

#[tokio::test]
async fn test_policy_table_matches_schema() {
    let (_dir, path) = migrated_db().await;
    let conn = Connection::open(&path).unwrap();
    let columns = extract_columns(&conn, "source_policies").unwrap();

    for name in [
        "domain",
        "seed_urls",
        "respect_robots",
        "retry_compliance_failures",
        "parser_settings",
        "alert_settings",
        "last_swept_at",
    ] {
        assert!(columns.contains_key(name), "missing column {}", name);
    }
    assert_eq!(columns["respect_robots"], ("BOOLEAN".to_string(), true));

    // Domain is unique.
    let now = "2026-01-01T00:00:00.000000Z";
    let insert = "INSERT INTO source_policies (id, name, domain, created_at, updated_at) \
                  VALUES (?1, 'x', 'example.com', ?2, ?2)";
    conn.execute(insert, rusqlite::params!["a", now]).unwrap();
    assert!(conn.execute(insert, rusqlite::params!["b", now]).is_err());
}

#[tokio::test]
async fn test_job_indexes() {
    let (_dir, path) = migrated_db().await;
    let conn = Connection::open(&path).unwrap();
    let indexes = extract_indexes(&conn).unwrap();

    assert_eq!(
        indexes["idx_harvest_jobs_status_created"],
        vec!["status".to_string(), "created_at".to_string()]
    );
    assert_eq!(indexes["idx_harvest_jobs_source_url"], vec!["source_url".to_string()]);
    assert_eq!(indexes["idx_harvest_jobs_next_retry"], vec!["next_retry_at".to_string()]);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (dir, _path) = migrated_db().await;
    let url = format!("sqlite:{}", dir.path().join("harvest.db").display());
    let applied = harvest::repository::migrations::run_migrations(&url)
        .await
        .unwrap();
    assert!(applied.is_empty());
}

#[test]
fn test_postgres_sql_generation() {
    use cetane::backend::Postgres;

    let registry = harvest::migrations::registry();
    let backend = Postgres;

    let ordered_names = registry
        .resolve_order()
        .expect("Failed to resolve migration order");

    for name in ordered_names {
        let migration = registry.get(name).expect("Migration not found");
        let statements = migration.forward_sql(&backend);
        assert!(
            !statements.is_empty(),
            "Migration {} produced no SQL for Postgres",
            migration.name
        );
        for stmt in &statements {
            assert!(
                !stmt.contains("AUTOINCREMENT"),
                "Migration {} uses AUTOINCREMENT in Postgres SQL",
                migration.name
            );
        }
    }
}
