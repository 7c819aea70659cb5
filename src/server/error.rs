//! Mapping of crate errors onto HTTP responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::error::HarvestError;

/// Handler error. Wraps `HarvestError` so handlers can use `?`.
#[derive(Debug)]
pub struct ApiError(pub HarvestError);

impl<E: Into<HarvestError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Uniform 429 body and `Retry-After` header.
pub fn rate_limited(retry_after_seconds: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "status": 429,
            "retry_after_seconds": retry_after_seconds,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HarvestError::Throttled {
                retry_after_seconds,
            } => return rate_limited(*retry_after_seconds),
            HarvestError::Validation(_) | HarvestError::InvalidState(_) => StatusCode::BAD_REQUEST,
            HarvestError::NotFound(_) => StatusCode::NOT_FOUND,
            HarvestError::Database(_) | HarvestError::Config(_) | HarvestError::Other(_) => {
                warn!("Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
