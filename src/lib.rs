//! Ambari Alerts: agent-side alert scheduling
//!
//! Runs the health checks an Ambari server pushes to each agent: alert
//! definitions are persisted to a cache directory, one recurring job is
//! scheduled per definition, and the most recent result of every alert is kept
//! for heartbeat reporting.
//!
//! # Features
//!
//! - **Persisted Definitions**: `definitions.json` survives agent restarts
//! - **Periodic Scheduler**: Fixed worker pool with coalesced execution
//! - **Lookup Keys**: `{{config-type/property}}` placeholders resolved against
//!   cluster configurations, best effort
//! - **Configuration Refresh**: New configuration values flow into running
//!   alerts without rescheduling
//! - **PORT Alerts**: TCP connect checks with warning/critical thresholds
//!
//! # Example
//!
//! ```no_run
//! use ambari_alerts::alerts::{AlertSchedulerHandler, HandlerConfig};
//!
//! let config = HandlerConfig::new("/var/lib/ambari-agent/cache/alerts");
//! let mut handler = AlertSchedulerHandler::new(config).unwrap();
//! handler.start().unwrap();
//!
//! for result in handler.collector().alerts() {
//!     println!("{} {}: {}", result.name, result.state, result.text);
//! }
//!
//! handler.stop();
//! ```

pub mod alerts;
pub mod scheduler;

// Re-export commonly used types
pub use alerts::{AlertCollector, AlertError, AlertResult, AlertSchedulerHandler, HandlerConfig};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
