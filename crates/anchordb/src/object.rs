//! Handles to single rows.

use crate::collection::LiveCollection;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::session::Session;
use anchordb_engine::{EngineError, PropertyType, RowKey, Snapshot, TableId, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A managed row, as seen by one session.
///
/// Reads go through the session's current view. The handle becomes
/// invalid when the row is removed or the session closes; stale handles
/// report [`Error::InvalidObject`] or [`Error::ObjectDisposed`] rather
/// than returning data.
#[derive(Clone)]
pub struct ObjectRef {
    session: Session,
    table: TableId,
    row: RowKey,
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("identity", self.session.identity())
            .field("table", &self.table)
            .field("row", &self.row)
            .finish()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.row == other.row
            && self.session.identity() == other.session.identity()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.identity().hash(state);
        self.table.hash(state);
        self.row.hash(state);
    }
}

impl ObjectRef {
    pub(crate) fn new(session: Session, table: TableId, row: RowKey) -> Self {
        Self {
            session,
            table,
            row,
        }
    }

    /// Returns the owning session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the row's table.
    #[must_use]
    pub const fn table(&self) -> TableId {
        self.table
    }

    /// Returns the row key.
    #[must_use]
    pub const fn row_key(&self) -> RowKey {
        self.row
    }

    /// Returns the table name.
    pub fn table_name(&self) -> Result<String> {
        self.session.with_view(|view, _| {
            view.table_name(self.table)
                .map(str::to_string)
                .ok_or_else(|| EngineError::table_not_found(self.table.to_string()).into())
        })?
    }

    /// Returns true while the session is open and the row exists in its
    /// current view.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.session
            .with_view(|view, _| view.contains_row(self.table, self.row))
            .unwrap_or(false)
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> Result<R>) -> Result<R> {
        self.session.with_view(|view, _| {
            if !view.contains_row(self.table, self.row) {
                return Err(removed());
            }
            f(view)
        })?
    }

    /// Reads a property.
    pub fn get(&self, property: &str) -> Result<Value> {
        self.read(|view| {
            view.value(self.table, self.row, property)
                .cloned()
                .ok_or_else(|| {
                    let table = view.table_name(self.table).unwrap_or_default();
                    EngineError::property_not_found(table, property).into()
                })
        })
    }

    /// Reads an integer property. `None` if the value is null.
    pub fn get_int(&self, property: &str) -> Result<Option<i64>> {
        typed(self.get(property)?, property, "int", |v| v.as_int())
    }

    /// Reads a text property. `None` if the value is null.
    pub fn get_text(&self, property: &str) -> Result<Option<String>> {
        typed(self.get(property)?, property, "text", |v| {
            v.as_text().map(str::to_string)
        })
    }

    /// Reads a boolean property. `None` if the value is null.
    pub fn get_bool(&self, property: &str) -> Result<Option<bool>> {
        typed(self.get(property)?, property, "bool", |v| v.as_bool())
    }

    /// Follows a link property.
    pub fn get_link(&self, property: &str) -> Result<Option<ObjectRef>> {
        let (target, key) = self.read(|view| {
            let schema = view
                .table_schema(self.table)
                .ok_or_else(|| EngineError::table_not_found(self.table.to_string()))?;
            let declared = schema
                .property(property)
                .ok_or_else(|| EngineError::property_not_found(&schema.name, property))?;
            let target = match &declared.kind {
                PropertyType::Link { target } => view.table_id(target),
                _ => None,
            }
            .ok_or_else(|| EngineError::TypeMismatch {
                    table: schema.name.clone(),
                    property: property.to_string(),
                    expected: "link".to_string(),
                })?;
            let key = view
                .value(self.table, self.row, property)
                .and_then(Value::as_link);
            Ok((target, key))
        })?;
        Ok(key.map(|key| ObjectRef::new(self.session.clone(), target, key)))
    }

    /// Writes a property. Must be called inside a write.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDisposed`] if the session is closed
    /// - [`Error::InvalidTransaction`] outside a write
    /// - [`Error::InvalidObject`] if the row was removed
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.session.with_batch(|batch| {
            if !batch.view().contains_row(self.table, self.row) {
                return Err(removed());
            }
            Ok(batch.set_value(self.table, self.row, property, value)?)
        })
    }

    /// Points a link property at `target`, or clears it.
    pub fn set_link(&self, property: &str, target: Option<&ObjectRef>) -> Result<()> {
        match target {
            Some(target) => {
                if !target.session.ptr_eq(&self.session) {
                    return Err(Error::invalid_state("linked object belongs to another session"));
                }
                self.set(property, Value::Link(target.row))
            }
            None => self.set(property, Value::Null),
        }
    }

    /// Returns the live collection behind a list property.
    pub fn list(&self, property: &str) -> Result<LiveCollection> {
        LiveCollection::for_list(self.session.clone(), self.table, self.row, property)
    }

    /// Removes the row. Must be called inside a write.
    pub fn remove(&self) -> Result<()> {
        self.session.with_batch(|batch| {
            if !batch.view().contains_row(self.table, self.row) {
                return Err(removed());
            }
            Ok(batch.remove_row(self.table, self.row)?)
        })
    }

    /// Reads the row into a model value.
    pub fn to_model<M: Model>(&self) -> Result<M> {
        M::read_from(self)
    }
}

fn removed() -> Error {
    Error::invalid_object("the object was removed")
}

fn typed<T>(
    value: Value,
    property: &str,
    expected: &str,
    extract: impl FnOnce(&Value) -> Option<T>,
) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    extract(&value).map(Some).ok_or_else(|| {
        Error::invalid_state(format!(
            "{property} holds {}, not {expected}",
            value.type_name()
        ))
    })
}

/// Name-based property access, for code that does not know the model
/// type at compile time.
pub trait DynamicObject {
    /// Reads a property by name. Yields `Value::Null` when the object or
    /// property cannot be read.
    fn get_by_name(&self, property: &str) -> Value;

    /// Writes a property by name.
    fn set_by_name(&self, property: &str, value: Value) -> Result<()>;
}

impl DynamicObject for ObjectRef {
    fn get_by_name(&self, property: &str) -> Value {
        self.get(property).unwrap_or_default()
    }

    fn set_by_name(&self, property: &str, value: Value) -> Result<()> {
        self.set(property, value)
    }
}
