//! Session configuration.

use crate::error::Result;
use crate::migration::Migration;
use anchordb_engine::{Identity, Schema, SealingKey, StoreOptions, KEY_SIZE};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Callback run inside the schema-upgrade write.
pub type MigrationCallback = Arc<dyn Fn(&mut Migration<'_>) -> Result<()> + Send + Sync>;

/// Configuration for opening a session.
///
/// A configuration is plain data and can be cloned onto worker threads;
/// every session opened from it shares the store behind [`Config::identity`].
#[derive(Clone)]
pub struct Config {
    /// Store identity. Handover packages only resolve on the same identity.
    pub identity: Identity,

    /// Whether to create the journal file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the journal on every commit.
    pub sync_on_commit: bool,

    /// Key used to seal the journal. A different key fails to open.
    pub encryption_key: Option<[u8; KEY_SIZE]>,

    /// Schema to create or upgrade to on open.
    pub schema: Option<Schema>,

    /// Version of [`Config::schema`].
    pub schema_version: u64,

    /// Run when the stored schema version is lower than `schema_version`.
    pub migration: Option<MigrationCallback>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: Identity::in_memory("default"),
            create_if_missing: true,
            sync_on_commit: true,
            encryption_key: None,
            schema: None,
            schema_version: 0,
            migration: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("identity", &self.identity)
            .field("create_if_missing", &self.create_if_missing)
            .field("sync_on_commit", &self.sync_on_commit)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("schema", &self.schema)
            .field("schema_version", &self.schema_version)
            .field("migration", &self.migration.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a journal file at `path`.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::default().identity(Identity::file(path))
    }

    /// Configuration for a named in-memory store.
    #[must_use]
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::default().identity(Identity::in_memory(name))
    }

    /// Sets the store identity.
    #[must_use]
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets whether to create the journal if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush the journal on every commit.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the journal encryption key.
    #[must_use]
    pub fn encryption_key(mut self, key: [u8; KEY_SIZE]) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the migration callback.
    #[must_use]
    pub fn migration<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Migration<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.migration = Some(Arc::new(callback));
        self
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            create_if_missing: self.create_if_missing,
            sync_on_commit: self.sync_on_commit,
            sealing_key: self.encryption_key.map(SealingKey::new),
        }
    }
}
