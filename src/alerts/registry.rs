//! Mapping from `source.type` to alert check constructors

use std::collections::HashMap;

use super::base::AlertCheck;
use super::config::AlertDefinition;
use super::port::PortAlert;
use super::AlertError;

pub type AlertConstructor = fn(&AlertDefinition) -> Result<Box<dyn AlertCheck>, AlertError>;

/// Alert check constructors keyed by upper-cased source type
#[derive(Clone)]
pub struct AlertRegistry {
    constructors: HashMap<String, AlertConstructor>,
}

impl AlertRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in check types
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PortAlert::SOURCE_TYPE, PortAlert::create);
        registry
    }

    /// Register (or replace) the constructor for a source type
    pub fn register(&mut self, source_type: &str, constructor: AlertConstructor) {
        self.constructors
            .insert(source_type.to_ascii_uppercase(), constructor);
    }

    pub fn supports(&self, source_type: &str) -> bool {
        self.constructors
            .contains_key(&source_type.to_ascii_uppercase())
    }

    /// Build the check for a definition
    pub fn create(&self, definition: &AlertDefinition) -> Result<Box<dyn AlertCheck>, AlertError> {
        let source_type = definition.source.source_type.to_ascii_uppercase();
        let constructor = self
            .constructors
            .get(&source_type)
            .ok_or(AlertError::UnsupportedSourceType(source_type))?;
        constructor(definition)
    }
}

impl Default for AlertRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AlertRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRegistry")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(source_type: &str) -> AlertDefinition {
        AlertDefinition::from_json(&json!({
            "name": "alert",
            "source": {
                "type": source_type,
                "uri": "localhost:80",
                "default_port": 80
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_port_is_supported() {
        let registry = AlertRegistry::with_defaults();
        assert!(registry.supports("PORT"));
        assert!(registry.supports("port"));

        let check = registry.create(&definition("PORT")).unwrap();
        assert_eq!(check.source_type(), "PORT");
    }

    #[test]
    fn test_unsupported_types() {
        let registry = AlertRegistry::default();

        for source_type in ["METRIC", "SCRIPT", "AGGREGATE"] {
            let err = registry
                .create(&definition(source_type))
                .err()
                .expect("unsupported type");
            assert!(
                matches!(err, AlertError::UnsupportedSourceType(ref t) if t == source_type),
                "unexpected error for {}: {}",
                source_type,
                err
            );
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = AlertRegistry::new();
        assert!(!registry.supports("PORT"));
        assert!(registry.create(&definition("PORT")).is_err());
    }
}
