//! Alert configuration types

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scheduler::MAX_INTERVAL;

/// One per-cluster block of `definitions.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCommand {
    /// Cluster the alerts belong to
    #[serde(default)]
    pub cluster_name: String,
    /// Host the agent runs on
    #[serde(default)]
    pub host_name: String,
    /// Nested configuration tree used to resolve lookup keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configurations: Option<Value>,
    /// Raw alert definition documents, parsed one at a time at load
    #[serde(default)]
    pub alert_definitions: Vec<Value>,
}

/// Alert definition as pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDefinition {
    /// Unique (per cluster) alert name
    pub name: String,
    /// Human-readable label
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "service")]
    pub service_name: Option<String>,
    #[serde(default, alias = "component")]
    pub component_name: Option<String>,
    /// Recurrence in the handler's configured unit
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Type-specific check description
    pub source: AlertSource,
}

fn default_enabled() -> bool {
    true
}

impl AlertDefinition {
    /// Parse a single raw definition document
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Recurrence of this alert; absent or non-positive values become 1
    pub fn interval(&self) -> u64 {
        match self.interval {
            Some(i) if i >= 1 => i as u64,
            _ => 1,
        }
    }

    /// Recurrence as a duration in minutes or seconds, capped at `MAX_INTERVAL`
    pub fn interval_duration(&self, in_minutes: bool) -> Duration {
        let n = self.interval();
        let secs = if in_minutes { n.saturating_mul(60) } else { n };
        Duration::from_secs(secs).min(MAX_INTERVAL)
    }

    /// Disabled definitions are kept on disk but never scheduled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Check description; `type` selects the implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub reporting: Reporting,
    /// Remaining type-specific parameters (`uri`, `default_port`, ...)
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl AlertSource {
    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Get an integer parameter, accepting numeric strings
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Per-state reporting texts and thresholds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reporting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<ReportingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<ReportingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<ReportingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown: Option<ReportingEntry>,
}

impl Reporting {
    /// Reporting entry for a state
    pub fn for_state(&self, state: AlertState) -> Option<&ReportingEntry> {
        match state {
            AlertState::Ok => self.ok.as_ref(),
            AlertState::Warning => self.warning.as_ref(),
            AlertState::Critical => self.critical.as_ref(),
            AlertState::Unknown => self.unknown.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingEntry {
    /// Text template with positional `{0}` / `{0:.4f}` placeholders
    pub text: String,
    /// Threshold, in seconds for PORT alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Outcome state of an alert check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Ok => "OK",
            AlertState::Warning => "WARNING",
            AlertState::Critical => "CRITICAL",
            AlertState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single alert result as reported in heartbeats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResult {
    pub name: String,
    pub label: Option<String>,
    pub state: AlertState,
    pub text: String,
    pub cluster: String,
    pub host: String,
    pub service: Option<String>,
    pub component: Option<String>,
    pub uuid: Option<String>,
    /// Collection time (unix millis)
    pub timestamp: i64,
}

/// Extract the keys of every `{{key}}` placeholder in a parameter value
pub fn placeholder_keys(value: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(value)
        .map(|c| c[1].to_string())
        .collect()
}

fn placeholder_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\S+?)\}\}").expect("valid placeholder regex"))
}

/// Alert scheduler handler configuration
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Directory holding `definitions.json`
    pub cache_dir: PathBuf,
    /// Interpret definition intervals as minutes (otherwise seconds)
    pub in_minutes: bool,
    /// Size of the job worker pool
    pub worker_threads: usize,
    /// Skip firings missed while a run overran its interval
    pub coalesce: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/lib/ambari-agent/cache/alerts"),
            in_minutes: true,
            worker_threads: 3,
            coalesce: true,
        }
    }
}

impl HandlerConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Create a config from environment variables
    /// AMBARI_ALERTS_CACHE_DIR=/var/lib/ambari-agent/cache/alerts
    /// AMBARI_ALERTS_IN_MINUTES=true
    /// AMBARI_ALERTS_WORKERS=3
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cache_dir = std::env::var("AMBARI_ALERTS_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);
        let in_minutes = std::env::var("AMBARI_ALERTS_IN_MINUTES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.in_minutes);
        let worker_threads = std::env::var("AMBARI_ALERTS_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.worker_threads);

        Self {
            cache_dir,
            in_minutes,
            worker_threads,
            coalesce: defaults.coalesce,
        }
    }

    /// Use seconds (false) or minutes (true) for intervals
    pub fn with_in_minutes(mut self, in_minutes: bool) -> Self {
        self.in_minutes = in_minutes;
        self
    }

    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n.max(1);
        self
    }

    pub fn with_coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }
}
