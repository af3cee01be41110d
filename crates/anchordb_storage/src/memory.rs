//! In-memory journal for tests and in-memory stores.

use crate::error::StorageResult;
use crate::frame::{decode_frames, encode_frame};
use crate::journal::Journal;
use parking_lot::RwLock;

/// A journal kept entirely in memory.
///
/// Frames are stored in the same encoded layout as [`FileJournal`](crate::FileJournal),
/// so recovery behaviour (torn tails, checksum failures) can be exercised
/// without touching the file system.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    bytes: RwLock<Vec<u8>>,
    count: u64,
}

impl InMemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal over previously captured bytes.
    ///
    /// A torn trailing frame is discarded, as it would be on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame in the middle fails its checksum.
    pub fn with_bytes(mut bytes: Vec<u8>) -> StorageResult<Self> {
        let (frames, valid) = decode_frames(&bytes)?;
        bytes.truncate(valid);
        Ok(Self {
            bytes: RwLock::new(bytes),
            count: frames.len() as u64,
        })
    }

    /// Returns a copy of the encoded journal.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl Journal for InMemoryJournal {
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        self.bytes.write().extend_from_slice(&encode_frame(frame));
        let index = self.count;
        self.count += 1;
        Ok(index)
    }

    fn frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        decode_frames(&self.bytes.read()).map(|(frames, _)| frames)
    }

    fn frame_count(&self) -> u64 {
        self.count
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
