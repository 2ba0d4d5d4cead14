//! Periodic job scheduler
//!
//! Runs interval jobs on a dedicated, fixed-size worker pool with coalesced
//! execution: a run that overruns its interval causes the missed firings to
//! be skipped instead of queued.

pub mod periodic;

pub use periodic::{Job, JobError, Scheduler, SchedulerConfig, SchedulerState, MAX_INTERVAL};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to build worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Scheduler has been shut down")]
    Shutdown,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Invalid interval for job {0}: interval must be non-zero")]
    InvalidInterval(String),
}
