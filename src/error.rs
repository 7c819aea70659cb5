//! Crate-level error type.

use thiserror::Error;

use crate::models::PolicyValidationError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    /// Rate limited. Never consumes retry budget.
    #[error("Rate limited, retry after {retry_after_seconds}s")]
    Throttled { retry_after_seconds: u64 },
    #[error("{0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

impl From<PolicyValidationError> for HarvestError {
    fn from(e: PolicyValidationError) -> Self {
        HarvestError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
