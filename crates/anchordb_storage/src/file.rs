//! File-backed journal.

use crate::error::{StorageError, StorageResult};
use crate::frame::{decode_frames, encode_frame};
use crate::journal::Journal;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in a single file.
///
/// The file is locked exclusively for as long as the journal is open, so
/// only one process can append to it. Within a process, the engine shares
/// one journal between every session opened on the same path.
///
/// A torn trailing frame left by a crash is truncated away on open.
///
/// # Example
///
/// ```no_run
/// use anchordb_storage::{FileJournal, Journal};
/// use std::path::Path;
///
/// let mut journal = FileJournal::open(Path::new("data.anchor"), true).unwrap();
/// journal.append(b"frame").unwrap();
/// journal.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
    count: u64,
}

impl FileJournal {
    /// Opens the journal at `path`.
    ///
    /// When `create_if_missing` is true, missing parent directories and the
    /// file itself are created.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file is missing and may not
    /// be created, [`StorageError::Locked`] if another process holds it, and
    /// I/O or corruption errors otherwise.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StorageError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (frames, valid) = decode_frames(&bytes)?;
        if valid < bytes.len() {
            file.set_len(valid as u64)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            count: frames.len() as u64,
        })
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&encode_frame(frame))?;
        file.flush()?;

        let index = self.count;
        self.count += 1;
        Ok(index)
    }

    fn frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode_frames(&bytes).map(|(frames, _)| frames)
    }

    fn frame_count(&self) -> u64 {
        self.count
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}

impl Drop for FileJournal {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&*self.file.lock());
    }
}
