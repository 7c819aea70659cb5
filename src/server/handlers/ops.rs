//! Telemetry, alerts, calibration and recovery endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::HarvestError;
use crate::ops::{CalibrationOptions, RecoveryRequest, TelemetryQuery};

use super::super::error::ApiResult;
use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct TelemetryParams {
    pub domain: Option<String>,
    pub since: Option<String>,
}

impl TelemetryParams {
    fn query(&self) -> Result<TelemetryQuery, HarvestError> {
        let since = match self.since.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| {
                        HarvestError::Validation(format!("Invalid since timestamp: {}", raw))
                    })?,
            ),
            None => None,
        };
        Ok(TelemetryQuery {
            domain: self.domain.clone().filter(|d| !d.trim().is_empty()),
            since,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CalibrateParams {
    #[serde(default)]
    pub apply: bool,
    pub min_jobs: Option<u64>,
    pub buffer_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyParams {
    #[serde(default)]
    pub apply: bool,
}

pub async fn telemetry(
    State(state): State<AppState>,
    Query(params): Query<TelemetryParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.query()?;
    Ok(Json(state.ctx.ops.telemetry(&query).await?))
}

pub async fn alerts(
    State(state): State<AppState>,
    Query(params): Query<TelemetryParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.query()?;
    Ok(Json(state.ctx.ops.alerts(&query).await?))
}

pub async fn calibrate(
    State(state): State<AppState>,
    Query(params): Query<CalibrateParams>,
) -> ApiResult<impl IntoResponse> {
    let settings = &state.ctx.settings;
    let options = CalibrationOptions {
        apply: params.apply,
        min_jobs: params
            .min_jobs
            .unwrap_or(settings.calibration_min_jobs.max(1) as u64),
        buffer_multiplier: params
            .buffer_multiplier
            .unwrap_or(settings.calibration_buffer_multiplier),
    };
    Ok(Json(state.ctx.ops.calibrate(&options).await?))
}

pub async fn recover(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ApplyParams>,
    Json(request): Json<RecoveryRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ctx.ops.recover(&id, &request, params.apply).await?))
}
