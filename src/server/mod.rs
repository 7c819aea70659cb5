//! HTTP API over policies, jobs, discovery and ops.
//!
//! Caller-facing routes that start work are limited per caller and route
//! class; every "try later" answer is a 429 with `Retry-After`.

mod error;
mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::context::HarvestContext;
use crate::rate_limit::{Clock, RouteLimiter, SystemClock};
use crate::repository::migrations::run_migrations;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub ctx: HarvestContext,
    pub limiter: Arc<RouteLimiter>,
}

impl AppState {
    pub fn new(ctx: HarvestContext) -> Self {
        Self::with_clock(ctx, Arc::new(SystemClock))
    }

    pub fn with_clock(ctx: HarvestContext, clock: Arc<dyn Clock>) -> Self {
        let limiter = Arc::new(RouteLimiter::new(ctx.settings.rate_limits.clone(), clock));
        Self { ctx, limiter }
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    run_migrations(&settings.database_url()).await?;

    let ctx = HarvestContext::from_settings(settings)?;
    let app = create_router(AppState::new(ctx));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::fetch::MemoryFetcher;
    use crate::rate_limit::RouteLimits;

    async fn setup_test_app(
        limits: RouteLimits,
    ) -> (axum::Router, Arc<MemoryFetcher>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.rate_limits = limits;
        settings.internal_token = Some("s3cret".to_string());
        run_migrations(&settings.database_url()).await.unwrap();

        let fetcher = Arc::new(MemoryFetcher::new());
        let ctx = HarvestContext::with_fetcher(&settings, fetcher.clone());
        (create_router(AppState::new(ctx)), fetcher, dir)
    }

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn create_example_policy(app: &axum::Router) -> Value {
        let (status, policy) = send(
            app,
            "POST",
            "/api/policies",
            Some(json!({
                "name": "Example Bar",
                "domain": " Example.COM ",
                "respect_robots": false
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        policy
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        let (status, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_policy_crud() {
        let (app, _fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        let policy = create_example_policy(&app).await;
        assert_eq!(policy["domain"], "example.com");
        let id = policy["id"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/policies",
            Some(json!({"name": "Again", "domain": "example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/policies/{}", id),
            Some(json!({"domain": "other.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, patched) = send(
            &app,
            "PATCH",
            &format!("/api/policies/{}", id),
            Some(json!({"max_pages": 12})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["max_pages"], 12);

        let (status, _) = send(&app, "DELETE", &format!("/api/policies/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", &format!("/api/policies/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_job_enqueue_and_fetch() {
        let (app, _fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        let (status, job) = send(
            &app,
            "POST",
            "/api/jobs",
            Some(json!({"source_url": "https://example.com/recipes/negroni"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["status"], "pending");
        assert_eq!(job["attempt_count"], 0);

        let path = format!("/api/jobs/{}", job["id"].as_str().unwrap());
        let (status, fetched) = send(&app, "GET", &path, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["source_url"], "https://example.com/recipes/negroni");

        let (status, pending) = send(&app, "GET", "/api/jobs/pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            "POST",
            "/api/jobs",
            Some(json!({"source_url": "ftp://example.com/x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_429_passes_through_without_spending_attempts() {
        let (app, fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        create_example_policy(&app).await;
        fetcher.insert_rate_limited("https://example.com/recipes/negroni", 4);
        let (_, job) = send(
            &app,
            "POST",
            "/api/jobs",
            Some(json!({"source_url": "https://example.com/recipes/negroni"})),
        )
        .await;
        let id = job["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/jobs/{}/run", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "4");

        let (_, after) = send(&app, "GET", &format!("/api/jobs/{}", id), None).await;
        assert_eq!(after["attempt_count"], 0);
        assert_eq!(after["status"], "pending");
    }

    #[tokio::test]
    async fn test_route_limit_rejects_with_retry_after() {
        let limits = RouteLimits {
            ingest_per_minute: 1,
            ..Default::default()
        };
        let (app, _fetcher, _dir) = setup_test_app(limits).await;
        let body = json!({
            "source_url": "https://example.com/recipes/manhattan",
            "raw_text": "Ingredients\n- 2 oz rye\n- 1 oz sweet vermouth\nInstructions\n- Stir."
        });

        let (status, _) = send(&app, "POST", "/api/ingest", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, rejected) = send(&app, "POST", "/api/ingest", Some(body.clone())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rejected["status"], 429);
        assert!(rejected["retry_after_seconds"].as_u64().unwrap() >= 1);

        // Trusted callers get their own window.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ingest")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-internal-token", "s3cret")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_telemetry_and_alerts_empty() {
        let (app, _fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        let (status, report) = send(&app, "GET", "/api/telemetry", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["global"]["total_jobs"], 0);
        assert!(report["domains"].as_array().unwrap().is_empty());

        let (status, alerts) = send(&app, "GET", "/api/alerts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(alerts.as_array().unwrap().is_empty());

        let (status, _) = send(&app, "GET", "/api/telemetry?since=yesterday", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recovery_unsupported_class() {
        let (app, _fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        let policy = create_example_policy(&app).await;
        let id = policy["id"].as_str().unwrap();

        let (status, suggestion) = send(
            &app,
            "POST",
            &format!("/api/policies/{}/recovery?apply=true", id),
            Some(json!({"parse_failure": "made-up-class"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(suggestion["supported"], false);
        assert_eq!(suggestion["applied"], false);

        let (status, _) = send(
            &app,
            "POST",
            "/api/policies/missing/recovery",
            Some(json!({"parse_failure": "domain-selector-mismatch"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_calibrate_rejects_bad_buffer() {
        let (app, _fetcher, _dir) = setup_test_app(RouteLimits::default()).await;
        let (status, _) =
            send(&app, "POST", "/api/policies/calibrate?buffer_multiplier=9", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, report) = send(&app, "POST", "/api/policies/calibrate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["apply"], false);
    }
}
