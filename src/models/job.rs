//! Harvest job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::normalized_host;
use super::recipe::{ParsedRecipe, Signals};
use super::strategy::ParseStrategy;

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses a run may start from.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Queued by an operator for a single URL.
    Web,
    /// Ingested with operator-supplied raw text.
    Manual,
    /// Queued by auto-harvest or a policy sweep.
    Discovery,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Manual => "manual",
            Self::Discovery => "discovery",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "web" => Some(Self::Web),
            "manual" => Some(Self::Manual),
            "discovery" => Some(Self::Discovery),
            _ => None,
        }
    }
}

/// A stored harvest job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestJob {
    pub id: String,
    pub source_url: String,
    pub source_type: SourceType,
    pub raw_text: Option<String>,
    pub canonical_name: Option<String>,
    pub author: Option<String>,
    #[serde(flatten)]
    pub signals: Signals,
    pub status: JobStatus,
    pub error: Option<String>,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set iff the job is failed with retry budget left.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Throttle deferral. Does not consume retry budget.
    pub deferred_until: Option<DateTime<Utc>>,
    pub parse_strategy: Option<ParseStrategy>,
    /// Present only when the compliance gate rejected the page.
    pub compliance_reasons: Option<Vec<String>>,
    pub extraction_confidence: Option<f64>,
    pub candidate: Option<ParsedRecipe>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HarvestJob {
    /// Telemetry key: URL host without `www.`.
    pub fn domain(&self) -> String {
        normalized_host(&self.source_url)
    }

    pub fn is_runnable(&self, now: DateTime<Utc>, max_attempts: i32) -> bool {
        crate::scheduler::is_runnable(
            self.status,
            self.attempt_count,
            self.next_retry_at,
            self.deferred_until,
            now,
            max_attempts,
        )
    }
}

/// Input for enqueueing a job.
#[derive(Debug, Clone)]
pub struct NewHarvestJob {
    pub source_url: String,
    pub source_type: SourceType,
    pub raw_text: Option<String>,
    pub canonical_name: Option<String>,
    pub author: Option<String>,
    pub signals: Signals,
    pub parse_strategy: Option<ParseStrategy>,
}

impl NewHarvestJob {
    pub fn web(source_url: &str) -> Self {
        Self {
            source_url: source_url.trim().to_string(),
            source_type: SourceType::Web,
            raw_text: None,
            canonical_name: None,
            author: None,
            signals: Signals::default(),
            parse_strategy: None,
        }
    }

    pub fn manual(source_url: &str, raw_text: &str, canonical_name: Option<String>) -> Self {
        Self {
            source_type: SourceType::Manual,
            raw_text: Some(raw_text.to_string()),
            canonical_name,
            ..Self::web(source_url)
        }
    }

    /// Job for a recipe found by discovery; carries the rendered candidate.
    pub fn discovered(recipe: &ParsedRecipe) -> Self {
        Self {
            source_url: recipe.source_url.clone(),
            source_type: SourceType::Discovery,
            raw_text: Some(recipe.render_raw_text()),
            canonical_name: Some(recipe.canonical_name.clone()),
            author: recipe.author.clone(),
            signals: recipe.signals,
            parse_strategy: Some(recipe.strategy()),
        }
    }
}
