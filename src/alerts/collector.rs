//! In-memory sink for alert results

use dashmap::DashMap;

use super::config::AlertResult;

/// Identity of an alert result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub cluster: String,
    pub name: String,
}

impl AlertKey {
    pub fn new(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            name: name.into(),
        }
    }
}

/// Most recent result per alert, read by the heartbeat reporter.
///
/// Writes from different jobs go to different keys; two writes to the same
/// key race and the last one wins.
#[derive(Debug, Default)]
pub struct AlertCollector {
    results: DashMap<AlertKey, AlertResult>,
}

impl AlertCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result, replacing any previous one for the same alert
    pub fn put(&self, result: AlertResult) {
        let key = AlertKey::new(result.cluster.clone(), result.name.clone());
        self.results.insert(key, result);
    }

    /// All current results
    pub fn alerts(&self) -> Vec<AlertResult> {
        self.results.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get(&self, cluster: &str, name: &str) -> Option<AlertResult> {
        self.results
            .get(&AlertKey::new(cluster, name))
            .map(|e| e.value().clone())
    }

    pub fn remove(&self, cluster: &str, name: &str) -> Option<AlertResult> {
        self.results
            .remove(&AlertKey::new(cluster, name))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::config::AlertState;
    use std::sync::Arc;

    fn result(cluster: &str, name: &str, state: AlertState) -> AlertResult {
        AlertResult {
            name: name.to_string(),
            label: None,
            state,
            text: state.to_string(),
            cluster: cluster.to_string(),
            host: "c6401".to_string(),
            service: None,
            component: None,
            uuid: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_put_overwrites() {
        let collector = AlertCollector::new();
        collector.put(result("c1", "port", AlertState::Ok));
        collector.put(result("c1", "port", AlertState::Critical));

        assert_eq!(collector.len(), 1);
        assert_eq!(
            collector.get("c1", "port").unwrap().state,
            AlertState::Critical
        );
    }

    #[test]
    fn test_identity_includes_cluster() {
        let collector = AlertCollector::new();
        collector.put(result("c1", "port", AlertState::Ok));
        collector.put(result("c2", "port", AlertState::Warning));

        assert_eq!(collector.alerts().len(), 2);
        assert_eq!(collector.remove("c1", "port").unwrap().state, AlertState::Ok);
        assert!(collector.get("c1", "port").is_none());
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let collector = Arc::new(AlertCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        collector.put(result("c1", &format!("alert-{}", i), AlertState::Ok));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.len(), 8);
    }
}
