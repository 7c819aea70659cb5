//! Auto-discovery harvest endpoint.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};

use crate::rate_limit::RouteClass;
use crate::scheduler::AutoHarvestRequest;

use super::super::error::ApiResult;
use super::super::AppState;
use super::admit;

pub async fn auto_harvest(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<AutoHarvestRequest>,
) -> ApiResult<impl IntoResponse> {
    admit(&state, &headers, peer, RouteClass::AutoHarvest)?;
    Ok(Json(state.ctx.harvester.harvest(&request).await?))
}
