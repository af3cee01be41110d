//! Error types for AnchorDB sessions.

use anchordb_engine::EngineError;
use thiserror::Error;

/// Result type for session operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by sessions and the handles derived from them.
///
/// Apart from [`Error::Engine`], every variant is a programmer error
/// reported at the point of misuse. None of them are retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The session, or the session a handle belongs to, is closed.
    #[error("session is closed")]
    ObjectDisposed,

    /// The object or collection is no longer valid.
    #[error("object is no longer valid: {reason}")]
    InvalidObject {
        /// Why the handle is invalid.
        reason: String,
    },

    /// Write-scope discipline was violated.
    #[error("invalid transaction: {message}")]
    InvalidTransaction {
        /// What was attempted.
        message: String,
    },

    /// A collection index was negative or not below the length.
    #[error("index {index} is out of range for a collection of length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: i64,
        /// Collection length at the time of the call.
        len: usize,
    },

    /// A handover package was resolved against a different store.
    #[error("handover package belongs to {expected}, not {actual}")]
    ConfigurationMismatch {
        /// Identity the package was created on.
        expected: String,
        /// Identity of the resolving session.
        actual: String,
    },

    /// A handover package was resolved a second time.
    #[error("handover package was already resolved")]
    AlreadyConsumed,

    /// The operation is not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the state is invalid.
        message: String,
    },

    /// The operation is not supported by this kind of handle.
    #[error("not supported: {message}")]
    NotSupported {
        /// What was attempted.
        message: String,
    },

    /// The backing store could not be opened.
    #[error("cannot open {identity}: {message}")]
    FileAccess {
        /// Identity that failed to open.
        identity: String,
        /// Reason reported by the engine.
        message: String,
    },

    /// The stored schema is incompatible and no migration applies.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the incompatibility.
        message: String,
    },

    /// A worker thread ended without producing a result.
    #[error("worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },

    /// Any other engine failure.
    #[error(transparent)]
    Engine(EngineError),
}

impl Error {
    /// Creates an invalid object error.
    pub fn invalid_object(reason: impl Into<String>) -> Self {
        Self::InvalidObject {
            reason: reason.into(),
        }
    }

    /// Creates an invalid transaction error.
    pub fn invalid_transaction(message: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Creates a worker error.
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::FileAccess { identity, message } => Self::FileAccess { identity, message },
            EngineError::SchemaMismatch { message } => Self::SchemaMismatch { message },
            other => Self::Engine(other),
        }
    }
}

/// Failure of [`Session::write`](crate::Session::write).
///
/// Separates "the closure failed" from "the write itself failed", so a
/// caller can tell its own error apart from a commit failure.
#[derive(Debug, Error)]
pub enum WriteError<E> {
    /// The closure returned an error. The write was rolled back.
    #[error("write callback failed: {0}")]
    Callback(E),

    /// Beginning or committing the write failed.
    #[error("write failed: {0}")]
    Commit(#[from] Error),
}

impl WriteError<Error> {
    /// Collapses both cases into one [`Error`].
    #[must_use]
    pub fn flatten(self) -> Error {
        match self {
            Self::Callback(err) | Self::Commit(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_time_engine_errors_surface_unchanged() {
        let err: Error = EngineError::file_access("memory:x", "bad key").into();
        assert!(matches!(err, Error::FileAccess { .. }));

        let err: Error = EngineError::schema_mismatch("format 9.0").into();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        let err: Error = EngineError::codec("truncated").into();
        assert!(matches!(err, Error::Engine(EngineError::Codec { .. })));
    }

    #[test]
    fn display_includes_bounds() {
        let err = Error::IndexOutOfRange { index: -1, len: 0 };
        assert_eq!(
            err.to_string(),
            "index -1 is out of range for a collection of length 0"
        );
    }

    #[test]
    fn write_error_flattens() {
        let err: WriteError<Error> = WriteError::Callback(Error::AlreadyConsumed);
        assert!(matches!(err.flatten(), Error::AlreadyConsumed));
        let err: WriteError<Error> = Error::ObjectDisposed.into();
        assert!(matches!(err.flatten(), Error::ObjectDisposed));
    }
}
