//! Engine configuration.

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of records a single database may hold (None = unlimited).
    ///
    /// Checked when a read-write transaction commits.
    pub max_records: Option<usize>,

    /// Name given to the event-loop thread.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_records: None,
            thread_name: "agilestore-engine".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-database record quota.
    #[must_use]
    pub const fn max_records(mut self, limit: usize) -> Self {
        self.max_records = Some(limit);
        self
    }

    /// Sets the event-loop thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_records, None);
        assert_eq!(config.thread_name, "agilestore-engine");
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new().max_records(10).thread_name("worker");
        assert_eq!(config.max_records, Some(10));
        assert_eq!(config.thread_name, "worker");
    }
}
