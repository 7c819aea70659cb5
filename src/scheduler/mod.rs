//! Job scheduling and execution.
//!
//! Retry timing is a pure function of job state and the current time; a
//! restarted process simply sweeps again. Throttling defers a job without
//! spending its retry budget.

mod auto_harvest;
mod retry;
mod runner;
mod sweep;

pub use auto_harvest::{AutoHarvestRequest, AutoHarvestResponse, AutoHarvester};
pub use retry::{compute_next_retry, compute_retry_delay, is_runnable, RetryPolicy};
pub use runner::JobRunner;
pub use sweep::{PolicySweepReport, SweepReport, Sweeper};
