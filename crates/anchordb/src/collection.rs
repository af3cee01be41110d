//! Live collections.
//!
//! A [`LiveCollection`] is an ordered view of row keys defined by a
//! source: a query over a table, or a list property of one row
//! (optionally filtered or sorted). Its contents are re-evaluated against
//! whatever snapshot its session currently sees; results are cached per
//! snapshot version outside writes.

use crate::changeset::ChangeSet;
use crate::error::{Error, Result};
use crate::notify::{Notification, NotificationToken, Subscription};
use crate::object::ObjectRef;
use crate::session::Session;
use anchordb_engine::{
    CompiledQuery, EngineError, HandoverPayload, Predicate, PropertyType, RowKey, Snapshot,
    SortDescriptor, TableId, Value, Version, WriteBatch,
};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub(crate) enum Source {
    Query(CompiledQuery),
    List {
        table: TableId,
        row: RowKey,
        property: String,
        target: TableId,
        query: Option<CompiledQuery>,
    },
}

impl Source {
    /// A list source, checked against `view`.
    pub(crate) fn list(
        view: &Snapshot,
        table: TableId,
        row: RowKey,
        property: &str,
        query: Option<CompiledQuery>,
    ) -> Result<Self> {
        let schema = view
            .table_schema(table)
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))?;
        let declared = schema
            .property(property)
            .ok_or_else(|| EngineError::property_not_found(&schema.name, property))?;
        let PropertyType::List { target } = &declared.kind else {
            return Err(EngineError::TypeMismatch {
                table: schema.name.clone(),
                property: property.to_string(),
                expected: "list".to_string(),
            }
            .into());
        };
        let target = view
            .table_id(target)
            .ok_or_else(|| EngineError::table_not_found(target))?;
        if !view.contains_row(table, row) {
            return Err(Error::invalid_object("the list's parent object was removed"));
        }
        Ok(Self::List {
            table,
            row,
            property: property.to_string(),
            target,
            query,
        })
    }
}

pub(crate) enum Delivery {
    /// `None` when the collection did not change (or did not advance).
    Changes(Option<ChangeSet>),
    Invalidated(Error),
}

pub(crate) struct CollectionState {
    source: Source,
    cache: RefCell<Option<(Version, Rc<[RowKey]>)>>,
    subscriptions: RefCell<Vec<Rc<Subscription>>>,
    observed: Cell<bool>,
    invalidated: Cell<bool>,
}

impl CollectionState {
    fn new(source: Source) -> Self {
        Self {
            source,
            cache: RefCell::new(None),
            subscriptions: RefCell::new(Vec::new()),
            observed: Cell::new(false),
            invalidated: Cell::new(false),
        }
    }

    /// Returns true the first time the state is registered for delivery.
    pub(crate) fn mark_observed(&self) -> bool {
        !self.observed.replace(true)
    }

    pub(crate) fn unsubscribe(&self, subscription: &Rc<Subscription>) {
        self.subscriptions
            .borrow_mut()
            .retain(|s| !Rc::ptr_eq(s, subscription));
    }

    fn target(&self) -> TableId {
        match &self.source {
            Source::Query(query) => query.table(),
            Source::List { target, .. } => *target,
        }
    }

    fn evaluate(&self, view: &Snapshot) -> Result<Vec<RowKey>> {
        match &self.source {
            Source::Query(query) => Ok(query.evaluate(view)),
            Source::List {
                table,
                row,
                property,
                query,
                ..
            } => match view.value(*table, *row, property) {
                Some(Value::List(keys)) => Ok(match query {
                    Some(query) => query.evaluate_within(view, keys.iter().copied()),
                    None => keys.clone(),
                }),
                _ => Err(Error::invalid_object("the list's parent object was removed")),
            },
        }
    }

    fn keys_at(&self, view: &Snapshot, writing: bool) -> Result<Rc<[RowKey]>> {
        if !writing {
            if let Some((version, keys)) = &*self.cache.borrow() {
                if *version == view.version() {
                    return Ok(Rc::clone(keys));
                }
            }
        }
        let keys: Rc<[RowKey]> = self.evaluate(view)?.into();
        if !writing {
            *self.cache.borrow_mut() = Some((view.version(), Rc::clone(&keys)));
        }
        Ok(keys)
    }

    fn valid_in(&self, view: &Snapshot) -> bool {
        match &self.source {
            Source::Query(query) => view.table_schema(query.table()).is_some(),
            Source::List { table, row, .. } => view.contains_row(*table, *row),
        }
    }

    /// Works out what this advance means for the collection's subscribers.
    pub(crate) fn prepare(&self, previous: &Snapshot, next: &Snapshot) -> Option<Delivery> {
        if self.invalidated.get() || self.subscriptions.borrow().is_empty() {
            return None;
        }
        if !self.valid_in(next) {
            self.invalidated.set(true);
            return Some(Delivery::Invalidated(Error::invalid_object(
                "the list's parent object was removed",
            )));
        }
        if previous.version() == next.version() {
            return Some(Delivery::Changes(None));
        }

        let old = self
            .keys_at(previous, false)
            .unwrap_or_else(|_| Rc::from(Vec::new()));
        let new = match self.keys_at(next, false) {
            Ok(keys) => keys,
            Err(err) => {
                self.invalidated.set(true);
                return Some(Delivery::Invalidated(err));
            }
        };
        let target = self.target();
        let changes = ChangeSet::compute(&old, &new, |key| !previous.same_row(next, target, key));
        Some(Delivery::Changes((!changes.is_empty()).then_some(changes)))
    }
}

/// An ordered, auto-updating view of rows.
#[derive(Clone)]
pub struct LiveCollection {
    session: Session,
    state: Rc<CollectionState>,
}

impl fmt::Debug for LiveCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCollection")
            .field("source", &self.state.source)
            .field("subscriptions", &self.state.subscriptions.borrow().len())
            .finish()
    }
}

impl LiveCollection {
    pub(crate) fn for_query(session: Session, query: CompiledQuery) -> Self {
        Self::from_source(session, Source::Query(query))
    }

    pub(crate) fn from_source(session: Session, source: Source) -> Self {
        Self {
            session,
            state: Rc::new(CollectionState::new(source)),
        }
    }

    pub(crate) fn from_state(session: Session, state: Rc<CollectionState>) -> Self {
        Self { session, state }
    }

    pub(crate) fn for_list(
        session: Session,
        table: TableId,
        row: RowKey,
        property: &str,
    ) -> Result<Self> {
        let source = session.with_view(|view, _| Source::list(view, table, row, property, None))??;
        Ok(Self::from_source(session, source))
    }

    pub(crate) fn handover_payload(&self) -> HandoverPayload {
        match &self.state.source {
            Source::Query(query) => HandoverPayload::Query {
                query: query.clone(),
            },
            Source::List {
                table,
                row,
                property,
                query,
                ..
            } => HandoverPayload::List {
                table: *table,
                row: *row,
                property: property.clone(),
                query: query.clone(),
            },
        }
    }

    /// Returns the owning session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the table the collection's rows belong to.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.state.target()
    }

    /// Returns true for collections backed by a list property.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.state.source, Source::List { .. })
    }

    /// Returns true while the session is open and, for lists, the parent
    /// row exists.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.session
            .with_view(|view, _| self.state.valid_in(view))
            .unwrap_or(false)
    }

    fn current_keys(&self) -> Result<Rc<[RowKey]>> {
        self.session
            .with_view(|view, writing| self.state.keys_at(view, writing))?
    }

    /// Returns the row keys in collection order.
    pub fn keys(&self) -> Result<Vec<RowKey>> {
        Ok(self.current_keys()?.to_vec())
    }

    /// Returns the number of rows.
    pub fn len(&self) -> Result<usize> {
        Ok(self.current_keys()?.len())
    }

    /// Returns true if the collection has no rows.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the object at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] if `index` is negative or not below the
    /// length, including on an empty collection.
    pub fn get(&self, index: i64) -> Result<ObjectRef> {
        let keys = self.current_keys()?;
        let key = usize::try_from(index)
            .ok()
            .and_then(|i| keys.get(i))
            .ok_or(Error::IndexOutOfRange {
                index,
                len: keys.len(),
            })?;
        Ok(ObjectRef::new(self.session.clone(), self.table(), *key))
    }

    /// Returns every object in order.
    pub fn to_vec(&self) -> Result<Vec<ObjectRef>> {
        let table = self.table();
        Ok(self
            .current_keys()?
            .iter()
            .map(|key| ObjectRef::new(self.session.clone(), table, *key))
            .collect())
    }

    /// Returns the position of `object`, if it is in the collection.
    pub fn position(&self, object: &ObjectRef) -> Result<Option<usize>> {
        if object.table() != self.table() {
            return Ok(None);
        }
        Ok(self
            .current_keys()?
            .iter()
            .position(|key| *key == object.row_key()))
    }

    /// Narrows the collection with another predicate.
    pub fn filter(&self, predicate: Predicate) -> Result<Self> {
        let source = self.session.with_view(|view, _| -> Result<Source> {
            Ok(match &self.state.source {
                Source::Query(query) => Source::Query(query.refine(view, predicate)?),
                Source::List {
                    table,
                    row,
                    property,
                    target,
                    query,
                } => {
                    let query = match query {
                        Some(query) => query.refine(view, predicate)?,
                        None => CompiledQuery::compile(view, *target, predicate, Vec::new())?,
                    };
                    Source::list(view, *table, *row, property, Some(query))?
                }
            })
        })??;
        Ok(Self::from_source(self.session.clone(), source))
    }

    /// Orders the collection by `sort`. Rows with equal sort values keep
    /// their current relative order.
    pub fn sorted_by(&self, sort: Vec<SortDescriptor>) -> Result<Self> {
        let source = self.session.with_view(|view, _| -> Result<Source> {
            Ok(match &self.state.source {
                Source::Query(query) => Source::Query(query.sorted(view, sort)?),
                Source::List {
                    table,
                    row,
                    property,
                    target,
                    query,
                } => {
                    let query = match query {
                        Some(query) => query.sorted(view, sort)?,
                        None => CompiledQuery::compile(view, *target, Predicate::True, sort)?,
                    };
                    Source::list(view, *table, *row, property, Some(query))?
                }
            })
        })??;
        Ok(Self::from_source(self.session.clone(), source))
    }

    /// Subscribes to changes. See [`crate::notify`] for the delivery
    /// convention.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDisposed`] if the session is closed
    /// - [`Error::InvalidTransaction`] inside a write
    /// - [`Error::InvalidObject`] if the collection is invalid
    pub fn subscribe<F>(&self, callback: F) -> Result<NotificationToken>
    where
        F: FnMut(&LiveCollection, Notification<'_>) + 'static,
    {
        self.session.ensure_open()?;
        if self.session.is_in_write() {
            return Err(Error::invalid_transaction(
                "cannot subscribe inside a write",
            ));
        }
        if !self.is_valid() {
            return Err(Error::invalid_object("the collection is no longer valid"));
        }
        let subscription = Rc::new(Subscription::new(Box::new(callback)));
        self.state
            .subscriptions
            .borrow_mut()
            .push(Rc::clone(&subscription));
        self.session.observe(&self.state);
        Ok(NotificationToken::new(&self.state, &subscription))
    }

    /// Calls every active subscriber, in subscribe order.
    pub(crate) fn dispatch(&self, delivery: &Delivery) {
        let subscriptions: Vec<Rc<Subscription>> = self.state.subscriptions.borrow().clone();
        for subscription in subscriptions {
            if self.session.is_closed() {
                break;
            }
            if !subscription.is_active() {
                continue;
            }
            match delivery {
                Delivery::Invalidated(err) => {
                    subscription.take_initial();
                    subscription.call(self, Notification::Error(err));
                }
                Delivery::Changes(changes) => {
                    if subscription.take_initial() {
                        subscription.call(self, Notification::Initial);
                    } else if let Some(changes) = changes {
                        subscription.call(self, Notification::Changed(changes));
                    }
                }
            }
        }
    }

    fn list_target(&self) -> Result<(TableId, RowKey, &str, TableId)> {
        match &self.state.source {
            Source::List {
                table,
                row,
                property,
                target,
                query: None,
            } => Ok((*table, *row, property.as_str(), *target)),
            Source::List { .. } => Err(Error::not_supported(
                "a filtered or sorted list cannot be modified",
            )),
            Source::Query(_) => Err(Error::not_supported(
                "query results cannot be modified directly",
            )),
        }
    }

    fn with_list<R>(
        &self,
        f: impl FnOnce(&mut WriteBatch, (TableId, RowKey, &str), usize) -> Result<R>,
    ) -> Result<R> {
        let (table, row, property, _) = self.list_target()?;
        self.session.with_batch(|batch| {
            if !batch.view().contains_row(table, row) {
                return Err(Error::invalid_object("the list's parent object was removed"));
            }
            let len = batch.list(table, row, property)?.len();
            f(batch, (table, row, property), len)
        })
    }

    fn member_key(&self, object: &ObjectRef) -> Result<RowKey> {
        let (.., target) = self.list_target()?;
        if object.table() != target {
            return Err(Error::invalid_state("object belongs to a different table"));
        }
        if !object.is_valid() {
            return Err(Error::invalid_object("cannot add an invalid object to a list"));
        }
        Ok(object.row_key())
    }

    /// Appends `object` to the list. Must be called inside a write.
    pub fn push(&self, object: &ObjectRef) -> Result<()> {
        let key = self.member_key(object)?;
        self.with_list(|batch, (table, row, property), len| {
            Ok(batch.list_insert(table, row, property, len, key)?)
        })
    }

    /// Inserts `object` at `index`. Must be called inside a write.
    pub fn insert(&self, index: usize, object: &ObjectRef) -> Result<()> {
        let key = self.member_key(object)?;
        self.with_list(|batch, (table, row, property), len| {
            if index > len {
                return Err(out_of_range(index, len));
            }
            Ok(batch.list_insert(table, row, property, index, key)?)
        })
    }

    /// Removes the entry at `index`. The row itself is kept.
    pub fn remove_at(&self, index: usize) -> Result<()> {
        self.with_list(|batch, (table, row, property), len| {
            if index >= len {
                return Err(out_of_range(index, len));
            }
            batch.list_remove(table, row, property, index)?;
            Ok(())
        })
    }

    /// Moves the entry at `from` so it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.with_list(|batch, (table, row, property), len| {
            if from >= len {
                return Err(out_of_range(from, len));
            }
            if to >= len {
                return Err(out_of_range(to, len));
            }
            Ok(batch.list_move(table, row, property, from, to)?)
        })
    }

    /// Removes every entry. The rows themselves are kept.
    pub fn clear(&self) -> Result<()> {
        self.with_list(|batch, (table, row, property), _| {
            Ok(batch.set_value(table, row, property, Value::List(Vec::new()))?)
        })
    }
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::IndexOutOfRange {
        index: i64::try_from(index).unwrap_or(i64::MAX),
        len,
    }
}
