//! Error types for the engine.

use crate::types::RowKey;
use anchordb_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Journal backend error after the store was opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A journal record or handover payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The backing store could not be opened.
    #[error("cannot open {identity}: {message}")]
    FileAccess {
        /// Identity that failed to open.
        identity: String,
        /// Reason for the failure.
        message: String,
    },

    /// The stored schema or format is incompatible with the requested one.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the incompatibility.
        message: String,
    },

    /// No table with the given name exists.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Table name.
        name: String,
    },

    /// A property is not declared on the table.
    #[error("property {property} not found on {table}")]
    PropertyNotFound {
        /// Table name.
        table: String,
        /// Property name.
        property: String,
    },

    /// A value does not fit the declared property type.
    #[error("type mismatch for {table}.{property}: expected {expected}")]
    TypeMismatch {
        /// Table name.
        table: String,
        /// Property name.
        property: String,
        /// Expected type description.
        expected: String,
    },

    /// A row does not exist in the snapshot being written.
    #[error("row {row} not found in {table}")]
    RowNotFound {
        /// Table name.
        table: String,
        /// Row key.
        row: RowKey,
    },

    /// A primary key value is already taken.
    #[error("duplicate primary key {value} in {table}")]
    DuplicatePrimaryKey {
        /// Table name.
        table: String,
        /// Rendered key value.
        value: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl EngineError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a file access error.
    pub fn file_access(identity: impl ToString, message: impl Into<String>) -> Self {
        Self::FileAccess {
            identity: identity.to_string(),
            message: message.into(),
        }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates a property not found error.
    pub fn property_not_found(table: impl Into<String>, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            table: table.into(),
            property: property.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
