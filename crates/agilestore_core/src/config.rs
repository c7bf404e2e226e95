//! Store and database configuration.

use crate::error::{CoreError, CoreResult};

/// Configuration of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store name, unique per database.
    pub name: String,

    /// Record field holding the primary key.
    pub key_path: String,

    /// Whether missing keys are generated.
    pub auto_increment: bool,

    /// Record fields with a secondary index.
    pub indices: Vec<String>,
}

impl StoreConfig {
    /// Creates a configuration with no indices and no key generator.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            auto_increment: false,
            indices: Vec::new(),
        }
    }

    /// Sets whether keys are generated.
    #[must_use]
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Adds an indexed field.
    #[must_use]
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indices.push(field.into());
        self
    }

    /// Adds several indexed fields.
    #[must_use]
    pub fn indices<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name or key path is empty, if an
    /// index repeats, or if the key path is also listed as an index.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::configuration("store name must not be empty"));
        }
        if self.key_path.is_empty() {
            return Err(CoreError::configuration(format!(
                "store `{}` needs a key path",
                self.name
            )));
        }
        for (i, index) in self.indices.iter().enumerate() {
            if index.is_empty() {
                return Err(CoreError::configuration(format!(
                    "store `{}` has an empty index name",
                    self.name
                )));
            }
            if *index == self.key_path {
                return Err(CoreError::configuration(format!(
                    "store `{}` lists its key path `{index}` as an index",
                    self.name
                )));
            }
            if self.indices[..i].contains(index) {
                return Err(CoreError::configuration(format!(
                    "store `{}` lists index `{index}` twice",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Name and version of a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Database name.
    pub name: String,

    /// Schema version; raising it runs the upgrade step.
    pub version: u32,
}

impl DbConfig {
    /// Creates a configuration at version 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
        }
    }

    /// Sets the version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty name or version 0.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::configuration("database name must not be empty"));
        }
        if self.version == 0 {
            return Err(CoreError::configuration("database version must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("people", "username")
            .auto_increment(true)
            .index("registrationDate")
            .indices(["city", "country"]);

        assert!(config.auto_increment);
        assert_eq!(config.indices, vec!["registrationDate", "city", "country"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn key_path_as_index_is_rejected() {
        let config = StoreConfig::new("people", "username").index("username");
        assert!(matches!(
            config.validate(),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let config = StoreConfig::new("people", "username").indices(["a", "a"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(StoreConfig::new("", "id").validate().is_err());
        assert!(StoreConfig::new("people", "").validate().is_err());
        assert!(DbConfig::new("").validate().is_err());
        assert!(DbConfig::new("app").version(0).validate().is_err());
    }

    #[test]
    fn db_config_defaults_to_version_one() {
        let config = DbConfig::new("app");
        assert_eq!(config.version, 1);
        assert_eq!(config.version(3).version, 3);
    }
}
