//! Data models for the harvest pipeline.

mod job;
mod policy;
mod recipe;
mod strategy;

pub use job::{HarvestJob, JobStatus, NewHarvestJob, SourceType};
pub use policy::{
    default_policies, host_matches_domain, match_policy, normalize_domain, normalized_host,
    MetricType, NewSourcePolicy, PolicyValidationError, ReviewPolicy, SettingsMap, SourcePolicy,
    SourcePolicyPatch,
};
pub use recipe::{Ingredient, ParsedRecipe, Signals};
pub use strategy::{ConfidenceBucket, FailureClass, FetchFailure, ParseStrategy, ParserKind};
