//! Property lookup for store facades.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;

/// How a record property can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// The store's key path.
    PrimaryKey,
    /// A declared secondary index.
    Index,
}

/// A store configuration with its property lookup built once.
#[derive(Debug)]
pub(crate) struct StoreSchema {
    config: StoreConfig,
    properties: HashMap<String, PropertyKind>,
}

impl StoreSchema {
    pub(crate) fn new(config: StoreConfig) -> Self {
        let mut properties = HashMap::with_capacity(config.indices.len() + 1);
        properties.insert(config.key_path.clone(), PropertyKind::PrimaryKey);
        for index in &config.indices {
            properties.insert(index.clone(), PropertyKind::Index);
        }
        Self { config, properties }
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn kind(&self, property: &str) -> Option<PropertyKind> {
        self.properties.get(property).copied()
    }

    pub(crate) fn resolve(&self, property: &str) -> CoreResult<PropertyKind> {
        self.kind(property)
            .ok_or_else(|| CoreError::invalid_property(self.name(), property))
    }

    pub(crate) fn require_index(&self, index: &str) -> CoreResult<()> {
        match self.kind(index) {
            Some(PropertyKind::Index) => Ok(()),
            _ => Err(CoreError::invalid_property(self.name(), index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> StoreSchema {
        StoreSchema::new(StoreConfig::new("people", "username").index("registrationDate"))
    }

    #[test]
    fn resolves_key_path_and_indices() {
        let schema = people();
        assert_eq!(schema.kind("username"), Some(PropertyKind::PrimaryKey));
        assert_eq!(schema.kind("registrationDate"), Some(PropertyKind::Index));
        assert_eq!(schema.kind("age"), None);
    }

    #[test]
    fn undeclared_property_is_rejected() {
        let err = people().resolve("age").unwrap_err();
        assert_eq!(err, CoreError::invalid_property("people", "age"));
    }

    #[test]
    fn key_path_is_not_an_index() {
        assert!(people().require_index("username").is_err());
        assert!(people().require_index("registrationDate").is_ok());
    }
}
