//! Harvest job endpoints.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::HarvestError;
use crate::models::{JobStatus, NewHarvestJob};
use crate::rate_limit::RouteClass;

use super::super::error::ApiResult;
use super::super::AppState;
use super::admit;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct JobListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub source_url: String,
    pub canonical_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source_url: String,
    pub raw_text: String,
    pub canonical_name: Option<String>,
    pub author: Option<String>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn validate_url(raw: &str) -> Result<(), HarvestError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|_| HarvestError::Validation(format!("Invalid source_url: {}", raw)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(HarvestError::Validation("source_url must be an http(s) URL".to_string()));
    }
    Ok(())
}

/// Enqueue a single harvest job.
pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<impl IntoResponse> {
    admit(&state, &headers, peer, RouteClass::SingleHarvest)?;
    validate_url(&request.source_url)?;
    let mut new = NewHarvestJob::web(&request.source_url);
    new.canonical_name = request.canonical_name;
    let job = state.ctx.jobs.create(&new).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// Enqueue a job carrying operator-supplied recipe text.
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<impl IntoResponse> {
    admit(&state, &headers, peer, RouteClass::Ingest)?;
    validate_url(&request.source_url)?;
    if request.raw_text.trim().is_empty() {
        return Err(HarvestError::Validation("raw_text is required".to_string()).into());
    }
    let mut new =
        NewHarvestJob::manual(&request.source_url, &request.raw_text, request.canonical_name);
    new.author = request.author;
    let job = state.ctx.jobs.create(&new).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> ApiResult<impl IntoResponse> {
    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            JobStatus::from_str(raw)
                .ok_or_else(|| HarvestError::Validation(format!("Unknown status: {}", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.ctx.jobs.list(status, clamp_limit(params.limit)).await?))
}

pub async fn list_pending_jobs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ctx.jobs.list_pending(Utc::now(), clamp_limit(params.limit)).await?))
}

pub async fn list_retryable_jobs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    let max_attempts = state.ctx.settings.retry.max_attempts;
    let jobs = state
        .ctx
        .jobs
        .list_retryable(Utc::now(), max_attempts, clamp_limit(params.limit))
        .await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .ctx
        .jobs
        .get(&id)
        .await?
        .ok_or_else(|| HarvestError::NotFound(format!("Job {}", id)))?;
    Ok(Json(job))
}

/// Run a job now. Throttling surfaces as 429 with the hint.
pub async fn run_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    admit(&state, &headers, peer, RouteClass::SingleHarvest)?;
    Ok(Json(state.ctx.runner.run(&id).await?))
}
