//! Sessions: one thread's view of a store.
//!
//! A [`Session`] pins one snapshot of its store and only moves it forward
//! on [`Session::refresh`], on its own commit, or when a write begins.
//! Sessions are built on `Rc` and are neither `Send` nor `Sync`, so using
//! one from another thread is rejected at compile time. To move an object
//! or collection to another thread, wrap it in a
//! [`ThreadSafeReference`](crate::ThreadSafeReference).

use crate::collection::{CollectionState, LiveCollection};
use crate::config::Config;
use crate::error::{Error, Result, WriteError};
use crate::migration::Migration;
use crate::model::{Fields, Model};
use crate::object::ObjectRef;
use crate::write::WriteScope;
use anchordb_engine::{
    open_store, CompiledQuery, EngineError, Identity, Predicate, Schema, Snapshot, Store, Value,
    Version, WriteBatch,
};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, trace};

/// A thread-confined handle onto one store.
///
/// Cloning a `Session` yields another handle to the same session, not a
/// new one. Open a second session with [`Session::open`].
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

struct SessionInner {
    config: Config,
    store: RefCell<Option<Arc<Store>>>,
    snapshot: RefCell<Arc<Snapshot>>,
    write: RefCell<Option<WriteBatch>>,
    observed: RefCell<Vec<Weak<CollectionState>>>,
    delivering: Cell<bool>,
}

struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.inner.config.identity)
            .field("version", &self.inner.snapshot.borrow().version())
            .field("closed", &self.is_closed())
            .field("in_write", &self.is_in_write())
            .finish()
    }
}

impl Session {
    /// Opens a session on the store named by `config.identity`.
    ///
    /// Sessions on the same identity share one store. The first open
    /// creates or upgrades the schema.
    ///
    /// # Errors
    ///
    /// - [`Error::FileAccess`] if the store cannot be opened
    /// - [`Error::SchemaMismatch`] if the stored schema is incompatible and
    ///   no migration applies
    pub fn open(config: Config) -> Result<Self> {
        let store = open_store(&config.identity, &config.store_options())?;
        prepare_schema(&store, &config)?;
        let snapshot = store.latest();
        debug!(
            identity = %config.identity,
            version = %snapshot.version(),
            "session opened"
        );
        Ok(Self {
            inner: Rc::new(SessionInner {
                config,
                store: RefCell::new(Some(store)),
                snapshot: RefCell::new(snapshot),
                write: RefCell::new(None),
                observed: RefCell::new(Vec::new()),
                delivering: Cell::new(false),
            }),
        })
    }

    /// Returns the configuration this session was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the store identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.inner.config.identity
    }

    /// Returns true once [`Session::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.store.borrow().is_none()
    }

    /// Returns true while a write is active.
    #[must_use]
    pub fn is_in_write(&self) -> bool {
        self.inner.write.borrow().is_some()
    }

    /// Returns true if `other` is a handle to this same session.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the version of the visible snapshot.
    pub fn version(&self) -> Result<Version> {
        self.ensure_open()?;
        Ok(self.inner.snapshot.borrow().version())
    }

    /// Returns the schema of the visible snapshot.
    pub fn schema(&self) -> Result<Schema> {
        self.with_view(|view, _| view.schema())
    }

    /// Closes the session.
    ///
    /// Rolls back an active write. Every object and collection obtained
    /// from this session becomes permanently invalid. Closing again is a
    /// no-op.
    pub fn close(&self) {
        let Some(store) = self.inner.store.borrow_mut().take() else {
            return;
        };
        if self.inner.write.borrow_mut().take().is_some() {
            trace!(identity = %self.identity(), "write rolled back by close");
        }
        self.inner.observed.borrow_mut().clear();
        debug!(identity = %self.identity(), "session closed");
        drop(store);
    }

    /// Starts a write.
    ///
    /// Blocks while another session holds the store's writer. Before the
    /// write starts, the session catches up to the latest snapshot and
    /// delivers the resulting notifications.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDisposed`] if the session is closed
    /// - [`Error::InvalidTransaction`] if a write is already active on this
    ///   session, or if called from a notification callback
    pub fn begin_write(&self) -> Result<WriteScope<'_>> {
        let store = self.store()?;
        if self.is_in_write() {
            return Err(Error::invalid_transaction(
                "a write is already active on this session",
            ));
        }
        if self.inner.delivering.get() {
            return Err(Error::invalid_transaction(
                "cannot begin a write while notifications are being delivered",
            ));
        }

        let batch = store.begin_write();
        self.advance_to(Arc::clone(batch.base()));
        if self.is_closed() {
            return Err(Error::ObjectDisposed);
        }
        trace!(identity = %self.identity(), version = %batch.base_version(), "write started");
        *self.inner.write.borrow_mut() = Some(batch);
        Ok(WriteScope::new(self))
    }

    /// Runs `f` inside a write and commits if it returns `Ok`.
    ///
    /// If `f` fails the write is rolled back and the error comes back as
    /// [`WriteError::Callback`]; a failure to begin or commit is
    /// [`WriteError::Commit`].
    pub fn write<T, E, F>(&self, f: F) -> Result<T, WriteError<E>>
    where
        F: FnOnce(&Session) -> Result<T, E>,
    {
        let scope = self.begin_write()?;
        match f(self) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                scope.rollback();
                Err(WriteError::Callback(err))
            }
        }
    }

    /// Advances to the latest committed snapshot and delivers
    /// notifications. Returns true if the version changed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransaction`] inside a write
    /// - [`Error::InvalidState`] from inside a notification callback
    pub fn refresh(&self) -> Result<bool> {
        let store = self.store()?;
        if self.is_in_write() {
            return Err(Error::invalid_transaction("cannot refresh inside a write"));
        }
        if self.inner.delivering.get() {
            return Err(Error::invalid_state(
                "cannot refresh while notifications are being delivered",
            ));
        }
        let latest = store.latest();
        let changed = latest.version() != self.inner.snapshot.borrow().version();
        self.advance_to(latest);
        Ok(changed)
    }

    /// Delivers pending initial notifications without advancing.
    pub fn process_notifications(&self) -> Result<()> {
        self.ensure_open()?;
        if self.is_in_write() {
            return Err(Error::invalid_transaction(
                "cannot deliver notifications inside a write",
            ));
        }
        if self.inner.delivering.get() {
            return Err(Error::invalid_state(
                "notifications are already being delivered",
            ));
        }
        let current = Arc::clone(&self.inner.snapshot.borrow());
        self.deliver(&current, &current);
        Ok(())
    }

    /// Creates a row from property values. Must be called inside a write.
    pub fn create<K, V>(
        &self,
        table: &str,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<ObjectRef>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let values: Vec<(String, Value)> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let (table_id, row) = self.with_batch(|batch| {
            let id = batch
                .view()
                .table_id(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            Ok((id, batch.create_row(id, values)?))
        })?;
        Ok(ObjectRef::new(self.clone(), table_id, row))
    }

    /// Adds a model instance. Must be called inside a write.
    pub fn add<M: Model>(&self, model: &M) -> Result<ObjectRef> {
        let mut fields = Fields::new();
        model.write_to(&mut fields);
        self.create(M::TABLE, fields.into_values())
    }

    /// Finds a row by primary key.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] if the table declares no primary key.
    pub fn find(&self, table: &str, key: impl Into<Value>) -> Result<Option<ObjectRef>> {
        let key = key.into();
        let found = self.with_view(|view, _| -> Result<Option<_>> {
            let id = view
                .table_id(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            if view
                .table_schema(id)
                .and_then(|schema| schema.primary_key())
                .is_none()
            {
                return Err(Error::not_supported(format!("{table} has no primary key")));
            }
            Ok(view.find_by_primary_key(id, &key).map(|row| (id, row)))
        })??;
        Ok(found.map(|(id, row)| ObjectRef::new(self.clone(), id, row)))
    }

    /// Removes an object. Must be called inside a write.
    pub fn remove(&self, object: &ObjectRef) -> Result<()> {
        if !object.session().ptr_eq(self) {
            return Err(Error::invalid_state("object belongs to another session"));
        }
        object.remove()
    }

    /// Every row of `table`, in table order.
    pub fn all(&self, table: &str) -> Result<LiveCollection> {
        let id = self.table_id(table)?;
        Ok(LiveCollection::for_query(
            self.clone(),
            CompiledQuery::all(id),
        ))
    }

    /// Rows of `table` matching `predicate`, in table order.
    pub fn filter(&self, table: &str, predicate: Predicate) -> Result<LiveCollection> {
        let query = self.with_view(|view, _| -> Result<CompiledQuery> {
            let id = view
                .table_id(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            Ok(CompiledQuery::compile(view, id, predicate, Vec::new())?)
        })??;
        Ok(LiveCollection::for_query(self.clone(), query))
    }

    fn table_id(&self, table: &str) -> Result<anchordb_engine::TableId> {
        self.with_view(|view, _| {
            view.table_id(table)
                .ok_or_else(|| Error::from(EngineError::table_not_found(table)))
        })?
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ObjectDisposed);
        }
        Ok(())
    }

    fn store(&self) -> Result<Arc<Store>> {
        self.inner
            .store
            .borrow()
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::ObjectDisposed)
    }

    pub(crate) fn is_delivering(&self) -> bool {
        self.inner.delivering.get()
    }

    /// Runs `f` against what this session currently sees: the write's
    /// working state inside a write, the pinned snapshot otherwise. The
    /// flag tells `f` whether a write is active.
    pub(crate) fn with_view<R>(&self, f: impl FnOnce(&Snapshot, bool) -> R) -> Result<R> {
        self.ensure_open()?;
        let write = self.inner.write.borrow();
        match write.as_ref() {
            Some(batch) => Ok(f(batch.view(), true)),
            None => Ok(f(&self.inner.snapshot.borrow(), false)),
        }
    }

    /// Runs `f` against the active write.
    pub(crate) fn with_batch<R>(&self, f: impl FnOnce(&mut WriteBatch) -> Result<R>) -> Result<R> {
        self.ensure_open()?;
        let mut write = self.inner.write.borrow_mut();
        let batch = write
            .as_mut()
            .ok_or_else(|| Error::invalid_transaction("cannot modify data outside a write"))?;
        f(batch)
    }

    pub(crate) fn observe(&self, state: &Rc<CollectionState>) {
        if !state.mark_observed() {
            return;
        }
        self.inner.observed.borrow_mut().push(Rc::downgrade(state));
    }

    pub(crate) fn commit_write(&self) -> Result<()> {
        let store = self.store()?;
        let batch = self
            .inner
            .write
            .borrow_mut()
            .take()
            .ok_or_else(|| Error::invalid_transaction("no active write"))?;
        let published = store.commit(batch)?;
        debug!(identity = %self.identity(), version = %published.version(), "write committed");
        self.advance_to(published);
        Ok(())
    }

    pub(crate) fn rollback_write(&self) {
        if self.inner.write.borrow_mut().take().is_some() {
            debug!(identity = %self.identity(), "write rolled back");
        }
    }

    fn advance_to(&self, next: Arc<Snapshot>) {
        let previous = std::mem::replace(&mut *self.inner.snapshot.borrow_mut(), Arc::clone(&next));
        if previous.version() != next.version() {
            trace!(
                identity = %self.identity(),
                from = %previous.version(),
                to = %next.version(),
                "snapshot advanced"
            );
        }
        self.deliver(&previous, &next);
    }

    /// Computes every observed collection's change first, then runs the
    /// callbacks, so all collections see `next` before any callback fires.
    fn deliver(&self, previous: &Snapshot, next: &Snapshot) {
        if self.inner.delivering.replace(true) {
            return;
        }
        let _guard = DeliveryGuard(&self.inner.delivering);

        let states: Vec<Rc<CollectionState>> = {
            let mut observed = self.inner.observed.borrow_mut();
            observed.retain(|state| state.strong_count() > 0);
            observed.iter().filter_map(Weak::upgrade).collect()
        };
        let ready: Vec<_> = states
            .into_iter()
            .filter_map(|state| state.prepare(previous, next).map(|d| (state, d)))
            .collect();

        for (state, delivery) in ready {
            if self.is_closed() {
                break;
            }
            let collection = LiveCollection::from_state(self.clone(), state);
            collection.dispatch(&delivery);
        }
    }
}

/// Creates, upgrades or checks the store schema against `config`.
fn prepare_schema(store: &Store, config: &Config) -> Result<()> {
    let Some(requested) = &config.schema else {
        return Ok(());
    };
    if !needs_upgrade(&store.latest(), requested, config)? {
        return Ok(());
    }

    let mut batch = store.begin_write();
    // Another session may have upgraded while we waited for the writer.
    let base = Arc::clone(batch.base());
    if !needs_upgrade(&base, requested, config)? {
        return Ok(());
    }
    let existing = !base.schema().is_empty();

    batch.apply_schema(requested, config.schema_version)?;
    if existing {
        if let Some(callback) = &config.migration {
            debug!(
                identity = %config.identity,
                from = base.schema_version(),
                to = config.schema_version,
                "running migration"
            );
            let mut migration = Migration::new(&mut batch, config.schema_version);
            callback(&mut migration)?;
        }
    }
    store.commit(batch)?;
    Ok(())
}

fn needs_upgrade(snapshot: &Snapshot, requested: &Schema, config: &Config) -> Result<bool> {
    let stored_version = snapshot.schema_version();
    if stored_version > config.schema_version {
        return Err(Error::SchemaMismatch {
            message: format!(
                "stored schema version {stored_version} is newer than {}",
                config.schema_version
            ),
        });
    }
    let changes = snapshot.schema().changes_to(requested);
    if changes.is_empty() && stored_version == config.schema_version {
        return Ok(false);
    }
    let existing = !snapshot.schema().is_empty();
    if let Some(breaking) = changes.iter().find(|c| !c.is_additive()) {
        if existing && (stored_version == config.schema_version || config.migration.is_none()) {
            return Err(Error::SchemaMismatch {
                message: format!("{breaking:?} requires a migration and a schema version bump"),
            });
        }
    }
    Ok(true)
}
