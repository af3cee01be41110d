//! Error types for journal operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for journal operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or appending journal frames.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal file does not exist and creation was not requested.
    #[error("journal not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Another process holds the journal lock.
    #[error("journal is locked by another process: {}", path.display())]
    Locked {
        /// Path of the locked journal.
        path: PathBuf,
    },

    /// A frame in the middle of the journal failed its checksum.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// The sealing key does not match the key the journal was created with.
    #[error("sealing key does not match journal")]
    KeyMismatch,

    /// Sealing or unsealing a frame failed.
    #[error("encryption error: {0}")]
    Encryption(String),
}
