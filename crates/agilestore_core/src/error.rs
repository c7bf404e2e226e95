//! Error types for agilestore core.

use agilestore_codec::CodecError;
use agilestore_engine::{EngineError, ErrorKind};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store and database operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The store facade has no connection yet.
    #[error("store `{store}` is not bound to a database")]
    NotBound {
        /// Name of the store.
        store: String,
    },

    /// The property is neither the key path nor a declared index.
    #[error("property `{property}` is neither the key path nor an index of store `{store}`")]
    InvalidProperty {
        /// Name of the store.
        store: String,
        /// The rejected property.
        property: String,
    },

    /// An engine request failed.
    #[error("[{kind}] {message}")]
    Request {
        /// Engine error kind.
        kind: ErrorKind,
        /// Engine error message.
        message: String,
    },

    /// The owning transaction aborted or could not be started.
    #[error("transaction failed: [{kind}] {message}")]
    Transaction {
        /// Engine error kind.
        kind: ErrorKind,
        /// Engine error message.
        message: String,
    },

    /// A store or database configuration is invalid.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// The record to update does not exist.
    #[error("no record with that key in store `{store}`")]
    RecordNotFound {
        /// Name of the store.
        store: String,
    },

    /// No store with that name was declared for the database.
    #[error("unknown store: {name}")]
    UnknownStore {
        /// Name of the store.
        name: String,
    },

    /// A record could not be converted.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Create a not-bound error.
    pub fn not_bound(store: impl Into<String>) -> Self {
        Self::NotBound {
            store: store.into(),
        }
    }

    /// Create an invalid-property error.
    pub fn invalid_property(store: impl Into<String>, property: impl Into<String>) -> Self {
        Self::InvalidProperty {
            store: store.into(),
            property: property.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Translates a request error.
    pub fn request(err: EngineError) -> Self {
        Self::Request {
            kind: err.kind,
            message: err.message,
        }
    }

    /// Translates a transaction error.
    pub fn transaction(err: EngineError) -> Self {
        Self::Transaction {
            kind: err.kind,
            message: err.message,
        }
    }

    /// Returns the engine error kind, if the error came from the engine.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Request { kind, .. } | Self::Transaction { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_keep_kind_and_message() {
        let err = CoreError::request(EngineError::constraint("key exists"));
        assert_eq!(err.kind(), Some(ErrorKind::Constraint));
        assert_eq!(err.to_string(), "[ConstraintError] key exists");
    }

    #[test]
    fn transaction_errors_are_distinct() {
        let err = CoreError::transaction(EngineError::abort("rolled back"));
        assert!(matches!(err, CoreError::Transaction { .. }));
        assert_eq!(err.kind(), Some(ErrorKind::Abort));
    }

    #[test]
    fn local_errors_have_no_kind() {
        assert_eq!(CoreError::not_bound("people").kind(), None);
    }
}
