//! Bound alerts: a typed check plus its cluster binding and helpers

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::{Captures, Regex};
use serde_json::Value;

use super::collector::AlertCollector;
use super::config::{placeholder_keys, AlertDefinition, AlertResult, AlertState};
use super::resolver::{ConfigMap, SharedConfigMap};
use super::AlertError;
use crate::scheduler::{Job, JobError};

/// Inputs available to a check while it runs
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub cluster: String,
    pub host_name: String,
    /// Snapshot of the cluster's resolved lookup keys
    pub config: ConfigMap,
}

impl CheckContext {
    /// Substitute `{{key}}` placeholders from the config map.
    ///
    /// A value without placeholders is returned unchanged; `None` if any
    /// placeholder is unresolved.
    pub fn lookup_property_value(&self, raw: &str) -> Option<String> {
        let keys = placeholder_keys(raw);
        if keys.is_empty() {
            return Some(raw.to_string());
        }

        let mut value = raw.to_string();
        for key in keys {
            let resolved = self.config.get(&key)?;
            value = value.replace(&format!("{{{{{}}}}}", key), &display_value(resolved));
        }
        Some(value)
    }
}

/// State plus the positional arguments for the reporting text
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub state: AlertState,
    pub args: Vec<Value>,
}

impl CheckOutcome {
    pub fn new(state: AlertState, args: Vec<Value>) -> Self {
        Self { state, args }
    }
}

/// Type-specific check routine
pub trait AlertCheck: Send + Sync {
    /// `source.type` this check implements
    fn source_type(&self) -> &'static str;

    /// Lookup keys this check needs resolved
    fn lookup_keys(&self) -> Vec<String>;

    /// Run the check. A failed probe is an outcome, not an error.
    fn check<'a>(&'a self, ctx: &'a CheckContext)
        -> BoxFuture<'a, Result<CheckOutcome, AlertError>>;
}

/// Fully initialized alert, ready to be scheduled
pub struct BoundAlert {
    definition: AlertDefinition,
    check: Box<dyn AlertCheck>,
    cluster: String,
    host_name: String,
    collector: Arc<AlertCollector>,
    config: SharedConfigMap,
}

/// Builder marker: cluster binding supplied
pub struct ClusterBinding {
    cluster: String,
    host_name: String,
}

/// Builder marker: collector and config map supplied
pub struct Helpers {
    collector: Arc<AlertCollector>,
    config: SharedConfigMap,
}

/// Builder for [`BoundAlert`]; `build` exists once both the cluster binding
/// and the helpers have been given.
pub struct BoundAlertBuilder<C, H> {
    definition: AlertDefinition,
    check: Box<dyn AlertCheck>,
    binding: C,
    helpers: H,
}

impl<H> BoundAlertBuilder<(), H> {
    pub fn cluster(
        self,
        cluster: impl Into<String>,
        host_name: impl Into<String>,
    ) -> BoundAlertBuilder<ClusterBinding, H> {
        BoundAlertBuilder {
            definition: self.definition,
            check: self.check,
            binding: ClusterBinding {
                cluster: cluster.into(),
                host_name: host_name.into(),
            },
            helpers: self.helpers,
        }
    }
}

impl<C> BoundAlertBuilder<C, ()> {
    pub fn helpers(
        self,
        collector: Arc<AlertCollector>,
        config: SharedConfigMap,
    ) -> BoundAlertBuilder<C, Helpers> {
        BoundAlertBuilder {
            definition: self.definition,
            check: self.check,
            binding: self.binding,
            helpers: Helpers { collector, config },
        }
    }
}

impl BoundAlertBuilder<ClusterBinding, Helpers> {
    pub fn build(self) -> BoundAlert {
        BoundAlert {
            definition: self.definition,
            check: self.check,
            cluster: self.binding.cluster,
            host_name: self.binding.host_name,
            collector: self.helpers.collector,
            config: self.helpers.config,
        }
    }
}

impl BoundAlert {
    pub fn builder(
        definition: AlertDefinition,
        check: Box<dyn AlertCheck>,
    ) -> BoundAlertBuilder<(), ()> {
        BoundAlertBuilder {
            definition,
            check,
            binding: (),
            helpers: (),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AlertDefinition {
        &self.definition
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn source_type(&self) -> &'static str {
        self.check.source_type()
    }

    /// Recurrence in the unit the handler is configured for
    pub fn interval(&self) -> u64 {
        self.definition.interval()
    }

    pub fn lookup_keys(&self) -> Vec<String> {
        self.check.lookup_keys()
    }

    pub fn collector(&self) -> &Arc<AlertCollector> {
        &self.collector
    }

    pub fn config_map(&self) -> &SharedConfigMap {
        &self.config
    }

    /// Run the check and record the result in the collector
    pub async fn collect(&self) -> Result<AlertResult, AlertError> {
        let ctx = CheckContext {
            cluster: self.cluster.clone(),
            host_name: self.host_name.clone(),
            config: self.config.read().clone(),
        };

        let outcome = self.check.check(&ctx).await?;
        let entry = self
            .definition
            .source
            .reporting
            .for_state(outcome.state)
            .ok_or_else(|| AlertError::MissingReporting {
                name: self.definition.name.clone(),
                state: outcome.state,
            })?;

        let result = AlertResult {
            name: self.definition.name.clone(),
            label: self.definition.label.clone(),
            state: outcome.state,
            text: format_text(&entry.text, &outcome.args),
            cluster: self.cluster.clone(),
            host: self.host_name.clone(),
            service: self.definition.service_name.clone(),
            component: self.definition.component_name.clone(),
            uuid: self.definition.uuid.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        tracing::debug!(
            cluster = %self.cluster,
            alert = %self.definition.name,
            state = %result.state,
            "Alert collected"
        );

        self.collector.put(result.clone());
        Ok(result)
    }
}

impl std::fmt::Debug for BoundAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAlert")
            .field("name", &self.definition.name)
            .field("source_type", &self.check.source_type())
            .field("cluster", &self.cluster)
            .field("host_name", &self.host_name)
            .finish()
    }
}

impl Job for BoundAlert {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn run(&self) -> BoxFuture<'_, Result<(), JobError>> {
        Box::pin(async move {
            self.collect().await?;
            Ok(())
        })
    }
}

/// Format a reporting template with positional `{N}` and `{N:.Pf}` placeholders.
/// Placeholders without a matching argument are left as-is.
pub fn format_text(template: &str, args: &[Value]) -> String {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\{(\d+)(?::\.(\d+)f)?\}").expect("valid format regex")
    });

    re.replace_all(template, |caps: &Captures| {
        let arg = caps[1].parse::<usize>().ok().and_then(|i| args.get(i));
        let Some(arg) = arg else {
            return caps[0].to_string();
        };

        match (caps.get(2), arg.as_f64()) {
            (Some(precision), Some(f)) => {
                let precision = precision.as_str().parse::<usize>().unwrap_or(0);
                format!("{:.*}", precision, f)
            }
            _ => display_value(arg),
        }
    })
    .into_owned()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
