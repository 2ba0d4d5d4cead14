//! Lookup-key resolution against cluster configuration trees
//!
//! A lookup key is a slash-delimited path such as
//! `hdfs-site/dfs.namenode.http-address`. Resolution is best effort: a key
//! whose path does not exist is left out of the result, so alerts still run
//! with partial configuration.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Flat mapping of lookup key to resolved value
pub type ConfigMap = HashMap<String, Value>;

/// Config map shared between the store and the alerts of one cluster
pub type SharedConfigMap = Arc<RwLock<ConfigMap>>;

/// Resolve each key against a nested configuration tree
pub fn resolve_lookup_keys<'a, I>(configurations: Option<&Value>, keys: I) -> ConfigMap
where
    I: IntoIterator<Item = &'a str>,
{
    let mut result = ConfigMap::new();
    let Some(root) = configurations else {
        return result;
    };

    for key in keys {
        if let Some(value) = resolve_key(root, key) {
            result.insert(key.to_string(), value.clone());
        }
    }

    result
}

fn resolve_key<'v>(root: &'v Value, key: &str) -> Option<&'v Value> {
    key.split('/')
        .try_fold(root, |node, layer| node.as_object()?.get(layer))
}

/// Lookup keys and resolved values for one cluster
struct ClusterEntry {
    keys: BTreeSet<String>,
    values: SharedConfigMap,
}

/// Per-cluster config maps, rebuilt on every definition load
#[derive(Default)]
pub struct ConfigMapStore {
    clusters: RwLock<HashMap<String, ClusterEntry>>,
}

impl ConfigMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cluster entry ahead of a reload
    pub fn clear(&self) {
        self.clusters.write().clear();
    }

    /// Record `keys` for a cluster, resolve them, and return the cluster's shared map
    pub fn record(
        &self,
        cluster: &str,
        configurations: Option<&Value>,
        keys: &[String],
    ) -> SharedConfigMap {
        let resolved = resolve_lookup_keys(configurations, keys.iter().map(String::as_str));

        let mut clusters = self.clusters.write();
        let entry = clusters
            .entry(cluster.to_string())
            .or_insert_with(|| ClusterEntry {
                keys: BTreeSet::new(),
                values: Arc::new(RwLock::new(ConfigMap::new())),
            });
        entry.keys.extend(keys.iter().cloned());
        entry.values.write().extend(resolved);

        Arc::clone(&entry.values)
    }

    /// Re-resolve the recorded keys of a known cluster and merge the values in.
    ///
    /// Returns the number of keys updated, or `None` when the cluster is unknown.
    pub fn refresh(&self, cluster: &str, configurations: Option<&Value>) -> Option<usize> {
        let clusters = self.clusters.read();
        let entry = clusters.get(cluster)?;

        let resolved = resolve_lookup_keys(configurations, entry.keys.iter().map(String::as_str));
        let updated = resolved.len();
        entry.values.write().extend(resolved);

        Some(updated)
    }

    /// Shared map for a cluster
    pub fn get(&self, cluster: &str) -> Option<SharedConfigMap> {
        self.clusters.read().get(cluster).map(|e| Arc::clone(&e.values))
    }

    /// Snapshot of a cluster's resolved values
    pub fn snapshot(&self, cluster: &str) -> Option<ConfigMap> {
        self.get(cluster).map(|m| m.read().clone())
    }

    pub fn contains(&self, cluster: &str) -> bool {
        self.clusters.read().contains_key(cluster)
    }

    /// Known cluster names
    pub fn clusters(&self) -> Vec<String> {
        self.clusters.read().keys().cloned().collect()
    }
}
