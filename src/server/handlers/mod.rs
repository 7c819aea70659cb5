//! HTTP request handlers.

mod harvest;
mod jobs;
mod ops;
mod policies;

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::rate_limit::{caller_identity, RouteClass};

use super::error::ApiError;
use super::AppState;

pub use harvest::auto_harvest;
pub use jobs::{
    create_job, get_job, ingest, list_jobs, list_pending_jobs, list_retryable_jobs, run_job,
};
pub use ops::{alerts, calibrate, recover, telemetry};
pub use policies::{create_policy, delete_policy, get_policy, list_policies, patch_policy};

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Count the request against the caller's route-class window.
fn admit(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    class: RouteClass,
) -> Result<(), ApiError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let peer = peer.map(|ConnectInfo(addr)| addr.ip().to_string());
    let caller = caller_identity(
        header_str("x-internal-token"),
        state.ctx.settings.internal_token.as_deref(),
        header_str(header::AUTHORIZATION.as_str()),
        peer.as_deref(),
    );
    state.limiter.admit(&caller, class)?;
    Ok(())
}
