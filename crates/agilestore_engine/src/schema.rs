//! Store and index definitions.

use std::collections::BTreeMap;

/// Parameters for creating an object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParams {
    /// Field holding the primary key inside each record (None = out-of-line keys).
    pub key_path: Option<String>,
    /// Whether missing keys are generated from a per-store counter.
    pub auto_increment: bool,
}

impl StoreParams {
    /// Creates parameters with no key path and no key generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Sets whether keys are generated.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Record field the index is built from.
    pub key_path: String,
    /// Whether two records may share an index key.
    pub unique: bool,
}

/// Definition of an object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    /// Store name.
    pub name: String,
    /// Field holding the primary key.
    pub key_path: Option<String>,
    /// Whether keys are generated.
    pub auto_increment: bool,
    /// Indexes by name.
    pub indexes: BTreeMap<String, IndexSchema>,
}

impl StoreSchema {
    pub(crate) fn new(name: &str, params: StoreParams) -> Self {
        Self {
            name: name.to_string(),
            key_path: params.key_path,
            auto_increment: params.auto_increment,
            indexes: BTreeMap::new(),
        }
    }

    /// Returns the index names in sorted order.
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }
}
