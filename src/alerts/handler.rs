//! Alert scheduler handler
//!
//! Owns the scheduler lifecycle and the mapping from persisted definitions to
//! live interval jobs. Reloads are all-or-nothing: the whole scheduler is torn
//! down and rebuilt, so at most one job set is ever active.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::base::BoundAlert;
use super::collector::AlertCollector;
use super::config::{AlertDefinition, ClusterCommand, HandlerConfig};
use super::registry::AlertRegistry;
use super::resolver::{resolve_lookup_keys, ConfigMap, ConfigMapStore, SharedConfigMap};
use super::store::DefinitionStore;
use super::AlertError;
use crate::scheduler::{Job, Scheduler, SchedulerConfig};

/// Schedules one recurring job per alert definition
pub struct AlertSchedulerHandler {
    config: HandlerConfig,
    store: DefinitionStore,
    registry: AlertRegistry,
    collector: Arc<AlertCollector>,
    config_maps: ConfigMapStore,
    /// `None` once stopped
    scheduler: Option<Scheduler>,
    /// Alerts registered with the current scheduler
    alerts: Vec<Arc<BoundAlert>>,
    loaded: bool,
}

impl AlertSchedulerHandler {
    /// Create a handler with the built-in alert types
    pub fn new(config: HandlerConfig) -> Result<Self, AlertError> {
        Self::with_registry(config, AlertRegistry::with_defaults())
    }

    pub fn with_registry(
        config: HandlerConfig,
        registry: AlertRegistry,
    ) -> Result<Self, AlertError> {
        let store = DefinitionStore::new(&config.cache_dir);
        if let Err(e) = store.ensure_dir() {
            tracing::error!(
                path = %store.dir().display(),
                error = %e,
                "Could not create the alert cache directory"
            );
        }

        let scheduler = Scheduler::new(scheduler_config(&config))?;

        Ok(Self {
            config,
            store,
            registry,
            collector: Arc::new(AlertCollector::new()),
            config_maps: ConfigMapStore::new(),
            scheduler: Some(scheduler),
            alerts: Vec::new(),
            loaded: false,
        })
    }

    /// Load definitions (once per scheduler) and start firing alert jobs
    pub fn start(&mut self) -> Result<(), AlertError> {
        if self.scheduler.is_none() {
            return Err(AlertError::Stopped);
        }

        if !self.loaded {
            let alerts = self.load_definitions();
            let scheduler = self.scheduler.as_mut().ok_or(AlertError::Stopped)?;

            for alert in &alerts {
                let every = alert.definition().interval_duration(self.config.in_minutes);
                scheduler.add_interval_job(Arc::clone(alert) as Arc<dyn Job>, every)?;
            }

            tracing::info!(
                alerts = alerts.len(),
                in_minutes = self.config.in_minutes,
                "Alert jobs scheduled"
            );
            self.alerts = alerts;
            self.loaded = true;
        }

        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.start()?;
        }
        Ok(())
    }

    /// Shut the scheduler down without waiting for running checks.
    /// The handler cannot be started again afterwards.
    pub fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown(false);
            tracing::info!("Alert scheduler stopped");
        }
        self.alerts.clear();
        self.loaded = false;
    }

    /// Persist new definitions; with `refresh_jobs`, rebuild every alert job.
    /// Definitions are still saved after `stop`, but jobs are not rebuilt.
    pub fn update_definitions(
        &mut self,
        commands: &[Value],
        refresh_jobs: bool,
    ) -> Result<(), AlertError> {
        self.store.save(commands)?;

        if !refresh_jobs {
            return Ok(());
        }
        if self.scheduler.is_none() {
            return Err(AlertError::Stopped);
        }

        tracing::info!("Reloading alert definitions");
        self.stop();
        self.scheduler = Some(Scheduler::new(scheduler_config(&self.config))?);
        self.start()
    }

    /// Refresh config values of already scheduled alerts from execution commands.
    ///
    /// Only lookup keys recorded at load time are updated; jobs are untouched.
    pub fn update_configurations(&self, commands: &[Value]) {
        for command in commands {
            let Some(cluster) = command.get("clusterName").and_then(Value::as_str) else {
                continue;
            };
            let Some(configurations) = command.get("configurations") else {
                continue;
            };

            if let Some(updated) = self.config_maps.refresh(cluster, Some(configurations)) {
                tracing::debug!(cluster = %cluster, updated, "Alert configuration refreshed");
            }
        }
    }

    /// Run the alerts described by `commands` once, right away, on the
    /// scheduler's workers. Returns the number of alerts submitted.
    pub fn execute_alert(&mut self, commands: &[Value]) -> Result<usize, AlertError> {
        let mut alerts = Vec::new();
        for raw in commands {
            let command: ClusterCommand = match serde_json::from_value(raw.clone()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed alert execution command");
                    continue;
                }
            };

            alerts.extend(self.build_alerts(&command, false, |keys| {
                match command.configurations.as_ref() {
                    Some(configurations) => Arc::new(RwLock::new(resolve_lookup_keys(
                        Some(configurations),
                        keys.iter().map(String::as_str),
                    ))),
                    None => self
                        .config_maps
                        .get(&command.cluster_name)
                        .unwrap_or_else(|| Arc::new(RwLock::new(ConfigMap::new()))),
                }
            }));
        }

        let scheduler = self.scheduler.as_mut().ok_or(AlertError::Stopped)?;
        let count = alerts.len();
        for alert in alerts {
            tracing::info!(
                cluster = %alert.cluster(),
                alert = %alert.name(),
                "Executing alert on demand"
            );
            scheduler.run_once(Arc::new(alert))?;
        }
        Ok(count)
    }

    /// Results collected so far
    pub fn collector(&self) -> Arc<AlertCollector> {
        Arc::clone(&self.collector)
    }

    /// Alerts scheduled by the current scheduler
    pub fn alerts(&self) -> &[Arc<BoundAlert>] {
        &self.alerts
    }

    /// Number of interval jobs registered with the current scheduler
    pub fn job_count(&self) -> usize {
        self.scheduler.as_ref().map_or(0, Scheduler::job_count)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(Scheduler::is_running)
    }

    /// Whether a scheduler is still owned (false after `stop`)
    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Snapshot of a cluster's resolved lookup keys
    pub fn config_map(&self, cluster: &str) -> Option<ConfigMap> {
        self.config_maps.snapshot(cluster)
    }

    pub fn definitions_store(&self) -> &DefinitionStore {
        &self.store
    }

    /// Read `definitions.json` and bind one alert per supported definition
    fn load_definitions(&self) -> Vec<Arc<BoundAlert>> {
        self.config_maps.clear();

        let mut alerts = Vec::new();
        for command in self.store.load() {
            let configurations = command.configurations.as_ref();
            // Every cluster gets a map, even one without supported alerts
            self.config_maps
                .record(&command.cluster_name, configurations, &[]);

            let bound = self.build_alerts(&command, true, |keys| {
                self.config_maps
                    .record(&command.cluster_name, configurations, keys)
            });
            alerts.extend(bound.into_iter().map(Arc::new));
        }
        alerts
    }

    fn build_alerts<F>(
        &self,
        command: &ClusterCommand,
        skip_disabled: bool,
        mut config_map_for: F,
    ) -> Vec<BoundAlert>
    where
        F: FnMut(&[String]) -> SharedConfigMap,
    {
        let mut alerts = Vec::new();

        for raw in &command.alert_definitions {
            let definition = match AlertDefinition::from_json(raw) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(
                        cluster = %command.cluster_name,
                        error = %e,
                        "Skipping malformed alert definition"
                    );
                    continue;
                }
            };

            if skip_disabled && !definition.is_enabled() {
                tracing::debug!(
                    cluster = %command.cluster_name,
                    alert = %definition.name,
                    "Skipping disabled alert definition"
                );
                continue;
            }

            let check = match self.registry.create(&definition) {
                Ok(check) => check,
                Err(e) => {
                    tracing::debug!(
                        cluster = %command.cluster_name,
                        alert = %definition.name,
                        error = %e,
                        "Skipping alert definition"
                    );
                    continue;
                }
            };

            let config_map = config_map_for(&check.lookup_keys());
            let alert = BoundAlert::builder(definition, check)
                .cluster(&command.cluster_name, &command.host_name)
                .helpers(Arc::clone(&self.collector), config_map)
                .build();
            alerts.push(alert);
        }

        alerts
    }
}

fn scheduler_config(config: &HandlerConfig) -> SchedulerConfig {
    SchedulerConfig {
        worker_threads: config.worker_threads,
        coalesce: config.coalesce,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::config::AlertState;
    use serde_json::json;
    use std::net::TcpListener;
    use std::time::Duration;
    use tempfile::TempDir;

    fn alert(name: &str, source_type: &str, uri: &str) -> Value {
        json!({
            "name": name,
            "label": name,
            "interval": 1,
            "source": {
                "type": source_type,
                "uri": uri,
                "default_port": 50070,
                "reporting": {
                    "ok": { "text": "TCP OK - {0:.4f} response on port {1}" },
                    "critical": { "text": "Connection failed: {0} to {1}:{2}", "value": 1.0 }
                }
            }
        })
    }

    fn command(cluster: &str, configurations: Value, definitions: Vec<Value>) -> Value {
        json!({
            "clusterName": cluster,
            "hostName": "127.0.0.1",
            "configurations": configurations,
            "alertDefinitions": definitions
        })
    }

    fn hdfs_configs(addr: &str) -> Value {
        json!({ "hdfs-site": { "dfs.namenode.http-address": addr } })
    }

    fn handler(dir: &TempDir) -> AlertSchedulerHandler {
        let config = HandlerConfig::new(dir.path().join("alerts")).with_in_minutes(false);
        AlertSchedulerHandler::new(config).unwrap()
    }

    #[test]
    fn test_creates_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let handler = handler(&temp_dir);
        assert!(handler.definitions_store().dir().is_dir());
        assert!(!handler.is_running());
    }

    #[test]
    fn test_unwritable_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();

        let config = HandlerConfig::new(file.join("alerts")).with_in_minutes(false);
        let mut handler = AlertSchedulerHandler::new(config).unwrap();
        assert!(!handler.definitions_store().dir().exists());

        handler.start().unwrap();
        assert!(handler.is_running());
        assert_eq!(handler.job_count(), 0);
        assert!(handler.alerts().is_empty());
        handler.stop();
    }

    #[test]
    fn test_start_without_definitions() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);

        handler.start().unwrap();
        assert!(handler.is_running());
        assert_eq!(handler.job_count(), 0);
        handler.stop();
    }

    #[test]
    fn test_start_schedules_port_alerts_only() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        let uri = "{{hdfs-site/dfs.namenode.http-address}}";

        handler
            .update_definitions(
                &[command(
                    "c1",
                    hdfs_configs("127.0.0.1:1"),
                    vec![
                        alert("port_a", "PORT", uri),
                        alert("metric_a", "METRIC", uri),
                        alert("script_a", "SCRIPT", uri),
                        alert("port_b", "PORT", "127.0.0.1:2"),
                    ],
                )],
                false,
            )
            .unwrap();

        handler.start().unwrap();
        assert_eq!(handler.job_count(), 2);
        assert_eq!(handler.alerts().len(), 2);

        // A second start does not register jobs again
        handler.start().unwrap();
        assert_eq!(handler.job_count(), 2);
        handler.stop();
    }

    #[test]
    fn test_disabled_definitions_not_scheduled() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        let mut disabled = alert("disabled", "PORT", "127.0.0.1:1");
        disabled["enabled"] = json!(false);

        handler
            .update_definitions(
                &[command(
                    "c1",
                    json!({}),
                    vec![alert("enabled", "PORT", "127.0.0.1:1"), disabled],
                )],
                false,
            )
            .unwrap();

        handler.start().unwrap();
        assert_eq!(handler.job_count(), 1);
        assert_eq!(handler.alerts()[0].name(), "enabled");
        handler.stop();
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let config = HandlerConfig::new(temp_dir.path().join("alerts"));
        assert!(config.in_minutes);
        let mut handler = AlertSchedulerHandler::new(config).unwrap();

        let mut definition = alert("rare", "PORT", "127.0.0.1:1");
        definition["interval"] = json!(400_000_000_000_000_000_i64);
        handler
            .update_definitions(&[command("c1", json!({}), vec![definition])], false)
            .unwrap();

        handler.start().unwrap();
        assert!(handler.is_running());
        assert_eq!(handler.job_count(), 1);
        assert_eq!(
            handler.alerts()[0].definition().interval_duration(true),
            crate::scheduler::MAX_INTERVAL
        );

        std::thread::sleep(Duration::from_millis(50));
        assert!(handler.collector().is_empty());
        handler.stop();
    }

    #[test]
    fn test_end_to_end_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        let definitions = vec![command(
            "c1",
            hdfs_configs("c6401.ambari.apache.org:50070"),
            vec![alert("namenode_port", "PORT", "{{hdfs-site/dfs.namenode.http-address}}")],
        )];
        handler.update_definitions(&definitions, false).unwrap();

        handler.start().unwrap();
        assert_eq!(handler.job_count(), 1);
        assert!(handler.is_running());

        let bound = &handler.alerts()[0];
        assert!(Arc::ptr_eq(bound.collector(), &handler.collector()));
        assert_eq!(
            bound.config_map().read()["hdfs-site/dfs.namenode.http-address"],
            json!("c6401.ambari.apache.org:50070")
        );
        assert_eq!(bound.cluster(), "c1");

        handler.stop();
        assert!(!handler.has_scheduler());
        assert!(!handler.is_running());
        assert!(matches!(handler.start(), Err(AlertError::Stopped)));

        // Definitions still persist, but jobs are not rebuilt
        let updated = vec![command("c1", json!({}), vec![alert("other", "PORT", "127.0.0.1:1")])];
        assert!(matches!(
            handler.update_definitions(&updated, true),
            Err(AlertError::Stopped)
        ));
        assert!(!handler.has_scheduler());
        assert_eq!(handler.job_count(), 0);
        assert_eq!(handler.definitions_store().load_raw().unwrap(), updated);
    }

    #[test]
    fn test_refresh_replaces_jobs() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        let uri = "127.0.0.1:1";

        handler
            .update_definitions(
                &[command(
                    "c1",
                    json!({}),
                    vec![alert("a", "PORT", uri), alert("b", "PORT", uri)],
                )],
                false,
            )
            .unwrap();
        handler.start().unwrap();
        assert_eq!(handler.job_count(), 2);

        handler
            .update_definitions(
                &[command("c1", json!({}), vec![alert("c", "PORT", uri)])],
                true,
            )
            .unwrap();

        assert!(handler.is_running());
        assert_eq!(handler.job_count(), 1);
        assert_eq!(handler.alerts()[0].name(), "c");
        handler.stop();
    }

    #[test]
    fn test_update_definitions_without_refresh_keeps_jobs() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        let commands = vec![command(
            "c1",
            json!({}),
            vec![alert("a", "PORT", "127.0.0.1:1")],
        )];

        handler.start().unwrap();
        handler.update_definitions(&commands, false).unwrap();

        assert_eq!(handler.job_count(), 0);
        assert_eq!(handler.definitions_store().load_raw().unwrap(), commands);
        handler.stop();
    }

    #[test]
    fn test_update_configurations() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        handler
            .update_definitions(
                &[command(
                    "c1",
                    json!({ "hdfs-site": { "x": "v1" } }),
                    vec![alert("a", "PORT", "{{hdfs-site/x}}")],
                )],
                false,
            )
            .unwrap();
        handler.start().unwrap();

        handler.update_configurations(&[
            json!({
                "clusterName": "c1",
                "configurations": { "hdfs-site": { "x": "v2", "y": "v3" } }
            }),
            json!({
                "clusterName": "unknown",
                "configurations": { "hdfs-site": { "x": "ignored" } }
            }),
            json!({ "commandType": "STATUS_COMMAND" }),
        ]);

        let mut expected = ConfigMap::new();
        expected.insert("hdfs-site/x".to_string(), json!("v2"));
        assert_eq!(handler.config_map("c1").unwrap(), expected);
        assert!(handler.config_map("unknown").is_none());
        // The scheduled alert shares the refreshed map
        assert_eq!(handler.alerts()[0].config_map().read()["hdfs-site/x"], json!("v2"));
        assert_eq!(handler.job_count(), 1);
        handler.stop();
    }

    #[test]
    fn test_execute_alert_runs_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        handler.start().unwrap();

        let submitted = handler
            .execute_alert(&[command(
                "c1",
                hdfs_configs(&addr),
                vec![alert("on_demand", "PORT", "{{hdfs-site/dfs.namenode.http-address}}")],
            )])
            .unwrap();
        assert_eq!(submitted, 1);
        assert_eq!(handler.job_count(), 0);

        let collector = handler.collector();
        let mut result = None;
        for _ in 0..50 {
            result = collector.get("c1", "on_demand");
            if result.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        let result = result.expect("alert result collected");
        assert_eq!(result.state, AlertState::Ok);
        assert!(result.text.starts_with("TCP OK - "));
        handler.stop();
    }

    #[test]
    fn test_scheduled_alert_reports_critical() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let temp_dir = TempDir::new().unwrap();
        let mut handler = handler(&temp_dir);
        handler
            .update_definitions(
                &[command(
                    "c1",
                    json!({}),
                    vec![alert("closed", "PORT", &format!("127.0.0.1:{}", port))],
                )],
                true,
            )
            .unwrap();

        let collector = handler.collector();
        let mut result = None;
        for _ in 0..60 {
            result = collector.get("c1", "closed");
            if result.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        handler.stop();

        let result = result.expect("alert result collected");
        assert_eq!(result.state, AlertState::Critical);
        assert!(result.text.contains(&port.to_string()));
    }
}
