//! Aggregation core.
//!
//! `job` holds the per-job merge logic; `engine` owns the set of live
//! jobs and the exactly-once finalize path.

pub mod engine;
pub mod job;

pub use engine::{AggregationEngine, StatsSnapshot};
