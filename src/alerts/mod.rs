//! Agent-side alert scheduling
//!
//! Loads server-pushed alert definitions, runs one recurring job per
//! definition, and keeps the latest result of each for heartbeat reporting.

pub mod base;
pub mod collector;
pub mod config;
pub mod handler;
pub mod port;
pub mod registry;
pub mod resolver;
pub mod store;

pub use base::{AlertCheck, BoundAlert, CheckContext, CheckOutcome};
pub use collector::{AlertCollector, AlertKey};
pub use config::{
    AlertDefinition, AlertResult, AlertSource, AlertState, ClusterCommand, HandlerConfig,
    Reporting, ReportingEntry,
};
pub use handler::AlertSchedulerHandler;
pub use port::PortAlert;
pub use registry::AlertRegistry;
pub use resolver::{resolve_lookup_keys, ConfigMap, ConfigMapStore, SharedConfigMap};
pub use store::DefinitionStore;

use crate::scheduler::SchedulerError;

/// Alert subsystem errors
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid alert definition {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("Unsupported alert source type: {0}")]
    UnsupportedSourceType(String),

    #[error("Alert {name} has no reporting text for state {state}")]
    MissingReporting { name: String, state: AlertState },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Alert scheduler has been stopped")]
    Stopped,
}
