//! Source policy CRUD.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::error::HarvestError;
use crate::models::{NewSourcePolicy, SourcePolicyPatch};

use super::super::error::ApiResult;
use super::super::AppState;

pub async fn list_policies(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ctx.policies.list().await?))
}

pub async fn create_policy(
    State(state): State<AppState>,
    Json(mut new): Json<NewSourcePolicy>,
) -> ApiResult<impl IntoResponse> {
    new.validate()?;
    if state.ctx.policies.get_by_domain(&new.domain).await?.is_some() {
        let message = format!("A policy for {} already exists", new.domain);
        return Err(HarvestError::Validation(message).into());
    }
    let policy = state.ctx.policies.create(new).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

pub async fn get_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let policy = state
        .ctx
        .policies
        .get(&id)
        .await?
        .ok_or_else(|| HarvestError::NotFound(format!("Source policy {}", id)))?;
    Ok(Json(policy))
}

/// Partial update. Changing the domain is rejected.
pub async fn patch_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SourcePolicyPatch>,
) -> ApiResult<impl IntoResponse> {
    let mut policy = state
        .ctx
        .policies
        .get(&id)
        .await?
        .ok_or_else(|| HarvestError::NotFound(format!("Source policy {}", id)))?;
    patch.apply_to(&mut policy)?;
    state.ctx.policies.update(&policy).await?;
    Ok(Json(policy))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.ctx.policies.delete(&id).await? {
        return Err(HarvestError::NotFound(format!("Source policy {}", id)).into());
    }
    Ok(Json(json!({ "deleted": id })))
}
