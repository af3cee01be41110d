//! The shared store behind every session on one identity.

use crate::error::{EngineError, EngineResult};
use crate::gate::WriterGate;
use crate::record::{JournalRecord, MAGIC};
use crate::snapshot::Snapshot;
use crate::types::Version;
use crate::write::WriteBatch;
use anchordb_storage::{
    FileJournal, InMemoryJournal, Journal, SealedJournal, SealingKey, StorageError,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, trace};

/// Journal format written by this version (major, minor).
///
/// Journals with a different major version are refused.
pub const FORMAT_VERSION: (u16, u16) = (1, 0);

/// What a store is keyed by in the process-wide registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// A journal file. The path is made absolute on construction.
    File(PathBuf),
    /// A named in-memory store. Its data lives as long as some session
    /// holds it open.
    InMemory(String),
}

impl Identity {
    /// Identity of a journal file.
    ///
    /// The parent directory is canonicalized when it exists, so two
    /// spellings of the same path share one store.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) {
            if let Ok(parent) = parent.canonicalize() {
                return Self::File(parent.join(name));
            }
        }
        Self::File(absolute)
    }

    /// Identity of a named in-memory store.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::InMemory(name.into())
    }

    /// Returns true for in-memory identities.
    #[must_use]
    pub const fn is_in_memory(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::InMemory(name) => write!(f, "memory:{name}"),
        }
    }
}

/// How a store is opened.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create the journal file if it does not exist.
    pub create_if_missing: bool,
    /// Flush the journal to disk on every commit.
    pub sync_on_commit: bool,
    /// Seal every journal frame with this key.
    pub sealing_key: Option<SealingKey>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            sealing_key: None,
        }
    }
}

pub(crate) fn key_fingerprint(key: Option<&SealingKey>) -> Option<[u8; 32]> {
    key.map(|key| {
        let digest = Sha256::digest(key.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    })
}

/// One open store: the journal, the latest published snapshot and the
/// writer gate. Shared by every session on the same identity.
pub struct Store {
    identity: Identity,
    key_fingerprint: Option<[u8; 32]>,
    sync_on_commit: bool,
    journal: Mutex<Box<dyn Journal>>,
    latest: RwLock<Arc<Snapshot>>,
    row_keys: Arc<AtomicU64>,
    gate: Arc<WriterGate>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("identity", &self.identity)
            .field("version", &self.version())
            .field("sealed", &self.key_fingerprint.is_some())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens the journal behind `identity` and replays it.
    pub(crate) fn open(identity: Identity, options: &StoreOptions) -> EngineResult<Self> {
        let journal: Box<dyn Journal> = match &identity {
            Identity::InMemory(_) => Box::new(InMemoryJournal::new()),
            Identity::File(path) => Box::new(
                FileJournal::open(path, options.create_if_missing)
                    .map_err(|e| EngineError::file_access(&identity, e.to_string()))?,
            ),
        };
        let mut journal: Box<dyn Journal> = match &options.sealing_key {
            Some(key) => Box::new(SealedJournal::open(journal, key).map_err(|e| match e {
                StorageError::KeyMismatch => {
                    EngineError::file_access(&identity, "encryption key does not match")
                }
                other => EngineError::file_access(&identity, other.to_string()),
            })?),
            None => journal,
        };

        let frames = journal
            .frames()
            .map_err(|e| EngineError::file_access(&identity, e.to_string()))?;
        let snapshot = if frames.is_empty() {
            journal.append(&JournalRecord::header(FORMAT_VERSION).encode()?)?;
            journal.sync()?;
            Snapshot::empty()
        } else {
            replay(&identity, &frames)?
        };

        debug!(
            identity = %identity,
            version = %snapshot.version(),
            commits = frames.len().saturating_sub(1),
            "store opened"
        );

        Ok(Self {
            key_fingerprint: key_fingerprint(options.sealing_key.as_ref()),
            sync_on_commit: options.sync_on_commit,
            journal: Mutex::new(journal),
            row_keys: Arc::new(AtomicU64::new(snapshot.next_row_key())),
            latest: RwLock::new(Arc::new(snapshot)),
            gate: Arc::new(WriterGate::default()),
            identity,
        })
    }

    /// Returns the store identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub(crate) fn key_fingerprint(&self) -> Option<[u8; 32]> {
        self.key_fingerprint
    }

    /// Returns the latest published snapshot.
    #[must_use]
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Returns the latest published version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.latest.read().version()
    }

    /// Starts a write batch on the latest snapshot, waiting for any other
    /// writer to finish first.
    pub fn begin_write(&self) -> WriteBatch {
        let permit = self.gate.acquire();
        WriteBatch::new(self.latest(), Arc::clone(&self.row_keys), permit)
    }

    /// Starts a write batch if no other writer is active.
    pub fn try_begin_write(&self) -> Option<WriteBatch> {
        let permit = self.gate.try_acquire()?;
        Some(WriteBatch::new(
            self.latest(),
            Arc::clone(&self.row_keys),
            permit,
        ))
    }

    /// Journals a batch and publishes its snapshot.
    ///
    /// An empty batch publishes nothing and returns its base. On error the
    /// batch is discarded and the latest snapshot is unchanged.
    pub fn commit(&self, batch: WriteBatch) -> EngineResult<Arc<Snapshot>> {
        let (base, mut working, mutations, permit) = batch.into_parts();
        if mutations.is_empty() {
            trace!(identity = %self.identity, "empty commit");
            return Ok(base);
        }

        let version = base.version().next();
        working.set_version(version);
        let count = mutations.len();
        let frame = JournalRecord::Commit {
            version,
            next_row_key: working.next_row_key(),
            mutations,
        }
        .encode()?;
        {
            let mut journal = self.journal.lock();
            journal.append(&frame)?;
            if self.sync_on_commit {
                journal.sync()?;
            }
        }

        let published = Arc::new(working);
        *self.latest.write() = Arc::clone(&published);
        drop(permit);

        debug!(identity = %self.identity, %version, mutations = count, "commit published");
        Ok(published)
    }
}

fn replay(identity: &Identity, frames: &[Vec<u8>]) -> EngineResult<Snapshot> {
    let header = JournalRecord::decode(&frames[0]).map_err(|_| {
        EngineError::file_access(identity, "not an AnchorDB journal, or it is encrypted")
    })?;
    match header {
        JournalRecord::Header { magic, format } if magic == MAGIC => {
            if format.0 != FORMAT_VERSION.0 {
                return Err(EngineError::schema_mismatch(format!(
                    "journal format {}.{} is not supported (expected {}.x)",
                    format.0, format.1, FORMAT_VERSION.0
                )));
            }
        }
        _ => {
            return Err(EngineError::file_access(
                identity,
                "not an AnchorDB journal, or it is encrypted",
            ))
        }
    }

    let mut snapshot = Snapshot::empty();
    for frame in &frames[1..] {
        let JournalRecord::Commit {
            version,
            next_row_key,
            mutations,
        } = JournalRecord::decode(frame)?
        else {
            return Err(EngineError::codec("unexpected header inside journal"));
        };
        if version != snapshot.version().next() {
            return Err(EngineError::codec(format!(
                "journal jumps from {} to {version}",
                snapshot.version()
            )));
        }
        for mutation in &mutations {
            snapshot.apply(mutation)?;
        }
        snapshot.set_version(version);
        snapshot.set_next_row_key(next_row_key);
    }
    Ok(snapshot)
}
