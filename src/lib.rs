//! cocktail-harvest - compliance-gated cocktail recipe harvesting.
//!
//! Fetches recipe pages under per-domain policies, extracts structured
//! candidates through a cascade of parsers, schedules retries with backoff
//! and rolls job history up into per-domain telemetry.

// Model types use `from_str` methods that return Option<Self>,
// not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

pub mod cli;
pub mod compliance;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod migrations;
pub mod models;
pub mod ops;
pub mod parser;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod scheduler;
pub mod server;

pub use error::HarvestError;
