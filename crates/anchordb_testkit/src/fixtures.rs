//! Session fixtures.
//!
//! Every fixture gets its own store identity, so tests running in
//! parallel never share data through the process-wide registry.

use crate::models::schema;
use anchordb::{Config, Session};
use std::path::PathBuf;
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Schema version the fixtures open with.
pub const SCHEMA_VERSION: u64 = 1;

/// A store identity plus whatever keeps it alive.
pub struct TestStore {
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// A uniquely named in-memory store with the test schema.
    pub fn memory() -> Self {
        let name = format!("test-{}", uuid::Uuid::new_v4());
        Self {
            config: Config::in_memory(name)
                .schema(schema())
                .schema_version(SCHEMA_VERSION),
            _temp_dir: None,
        }
    }

    /// A journal file in a fresh temporary directory, with the test schema.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.anchordb");
        Self {
            config: Config::file(path)
                .schema(schema())
                .schema_version(SCHEMA_VERSION)
                .sync_on_commit(false),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the configuration sessions are opened with.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// Returns the journal path if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|d| d.path().join("test.anchordb"))
    }

    /// Opens a new session on the store.
    pub fn open(&self) -> Session {
        init_tracing();
        Session::open(self.config()).expect("Failed to open session")
    }
}

/// Runs a test with a session on a fresh in-memory store.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&Session) -> R,
{
    let store = TestStore::memory();
    let session = store.open();
    f(&session)
}

/// Installs a test subscriber once per process, filtered by `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
