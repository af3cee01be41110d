//! Journal trait definition.

use crate::error::StorageResult;

/// An append-only sequence of opaque frames.
///
/// # Invariants
///
/// - `append` returns the zero-based index of the new frame
/// - `frames` returns every intact frame in append order
/// - a frame is never partially visible: a torn trailing write is dropped
///   on the next open rather than surfaced
/// - after `sync` returns, every appended frame survives process exit
pub trait Journal: Send + Sync {
    /// Appends a frame and returns its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64>;

    /// Reads all frames in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`](crate::StorageError::Corrupted)
    /// if a frame other than the last one fails its checksum.
    fn frames(&self) -> StorageResult<Vec<Vec<u8>>>;

    /// Returns the number of frames appended so far.
    fn frame_count(&self) -> u64;

    /// Makes every appended frame durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;
}
