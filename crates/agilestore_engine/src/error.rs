//! Error types for engine operations.

use agilestore_codec::CodecError;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Category of an engine failure.
///
/// Names mirror the exception names of the browser storage API this engine
/// models, so translated messages stay familiar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A uniqueness constraint was violated.
    Constraint,
    /// A key or value was not acceptable.
    Data,
    /// A named database object does not exist.
    NotFound,
    /// The object is not in a state that allows the operation.
    InvalidState,
    /// The arguments do not describe a valid access.
    InvalidAccess,
    /// The owning transaction is no longer accepting requests.
    TransactionInactive,
    /// A write was attempted in a read-only transaction.
    ReadOnly,
    /// The transaction or version change was aborted.
    Abort,
    /// The requested version is lower than the stored one.
    Version,
    /// The database would grow past its configured quota.
    QuotaExceeded,
}

impl ErrorKind {
    /// Returns the canonical name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::Constraint => "ConstraintError",
            ErrorKind::Data => "DataError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::InvalidState => "InvalidStateError",
            ErrorKind::InvalidAccess => "InvalidAccessError",
            ErrorKind::TransactionInactive => "TransactionInactiveError",
            ErrorKind::ReadOnly => "ReadOnlyError",
            ErrorKind::Abort => "AbortError",
            ErrorKind::Version => "VersionError",
            ErrorKind::QuotaExceeded => "QuotaExceededError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error reported by a request, a transaction, or an open request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl EngineError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Constraint, message)
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Creates an abort error.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Abort, message)
    }

    pub(crate) fn inactive() -> Self {
        Self::new(
            ErrorKind::TransactionInactive,
            "the transaction has finished or is committing",
        )
    }
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        EngineError::data(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_name() {
        let err = EngineError::constraint("key already exists");
        assert_eq!(err.to_string(), "ConstraintError: key already exists");
    }

    #[test]
    fn codec_errors_become_data_errors() {
        let err: EngineError = CodecError::invalid_key("null").into();
        assert_eq!(err.kind, ErrorKind::Data);
    }
}
