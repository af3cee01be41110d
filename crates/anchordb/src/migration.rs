//! Schema migration context.
//!
//! When a session opens a store whose schema version is lower than the
//! configured one, the new schema is applied inside a write and the
//! configured [`MigrationCallback`](crate::MigrationCallback) runs in that
//! same write. It sees the store as it was before the upgrade through
//! [`Migration::old_value`] and edits the upgraded rows through
//! [`Migration::set`]. Returning an error rolls the whole upgrade back.

use crate::error::{Error, Result};
use anchordb_engine::{RowKey, Snapshot, TableId, Value, WriteBatch};
use std::sync::Arc;

/// Context handed to a migration callback.
pub struct Migration<'a> {
    old: Arc<Snapshot>,
    batch: &'a mut WriteBatch,
    old_version: u64,
    new_version: u64,
}

impl<'a> Migration<'a> {
    pub(crate) fn new(batch: &'a mut WriteBatch, new_version: u64) -> Self {
        let old = Arc::clone(batch.base());
        Self {
            old_version: old.schema_version(),
            old,
            batch,
            new_version,
        }
    }

    /// Schema version stored before the upgrade.
    #[must_use]
    pub const fn old_schema_version(&self) -> u64 {
        self.old_version
    }

    /// Schema version being upgraded to.
    #[must_use]
    pub const fn new_schema_version(&self) -> u64 {
        self.new_version
    }

    /// The store as it was before the upgrade.
    #[must_use]
    pub fn old_snapshot(&self) -> &Snapshot {
        &self.old
    }

    /// The store with the new schema and every change made so far.
    #[must_use]
    pub fn new_snapshot(&self) -> &Snapshot {
        self.batch.view()
    }

    fn table(&self, name: &str) -> Result<TableId> {
        self.batch
            .view()
            .table_id(name)
            .ok_or_else(|| Error::Engine(anchordb_engine::EngineError::table_not_found(name)))
    }

    /// Row keys of `table` after the upgrade.
    pub fn rows(&self, table: &str) -> Result<Vec<RowKey>> {
        Ok(self.batch.view().keys(self.table(table)?))
    }

    /// Reads a property as it was stored before the upgrade.
    ///
    /// Returns `None` if the table, row or property did not exist.
    #[must_use]
    pub fn old_value(&self, table: &str, row: RowKey, property: &str) -> Option<Value> {
        let id = self.old.table_id(table)?;
        self.old.value(id, row, property).cloned()
    }

    /// Reads a property after the upgrade.
    #[must_use]
    pub fn value(&self, table: &str, row: RowKey, property: &str) -> Option<Value> {
        let view = self.batch.view();
        let id = view.table_id(table)?;
        view.value(id, row, property).cloned()
    }

    /// Overwrites a property of an upgraded row.
    pub fn set(&mut self, table: &str, row: RowKey, property: &str, value: Value) -> Result<()> {
        let id = self.table(table)?;
        Ok(self.batch.set_value(id, row, property, value)?)
    }

    /// Creates a row in the upgraded store.
    pub fn create(
        &mut self,
        table: &str,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<RowKey> {
        let id = self.table(table)?;
        Ok(self.batch.create_row(id, values)?)
    }

    /// Removes a row from the upgraded store.
    pub fn remove(&mut self, table: &str, row: RowKey) -> Result<()> {
        let id = self.table(table)?;
        Ok(self.batch.remove_row(id, row)?)
    }
}
