//! Batch-level entry points: configuration, a blocking runner and reports.
//!
//! The orchestrator itself is callback driven; this module wraps it for
//! callers that just want a finished [`FinalResult`](crate::FinalResult).

mod config;
mod report;
mod runner;

pub use config::{default_scenarios, load_scenarios, BatchConfig};
pub use report::BatchReport;
pub use runner::run_batch;
