//! Write batches.

use crate::error::{EngineError, EngineResult};
use crate::gate::WriterPermit;
use crate::schema::{Property, Schema};
use crate::snapshot::Snapshot;
use crate::types::{RowKey, TableId, Version};
use crate::value::{PropertyType, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One journaled change. Replaying a commit's mutations in order against
/// its base snapshot reproduces the committed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Create or update tables and record the schema version.
    ApplySchema {
        /// Requested schema.
        schema: Schema,
        /// Schema version to record.
        version: u64,
    },
    /// Insert a row with a complete set of values.
    CreateRow {
        /// Table.
        table: TableId,
        /// Newly allocated key.
        row: RowKey,
        /// Every property value.
        values: BTreeMap<String, Value>,
    },
    /// Overwrite one property.
    SetValue {
        /// Table.
        table: TableId,
        /// Row.
        row: RowKey,
        /// Property name.
        property: String,
        /// New value.
        value: Value,
    },
    /// Remove a row, clearing links and list entries that point at it.
    RemoveRow {
        /// Table.
        table: TableId,
        /// Row.
        row: RowKey,
    },
}

/// Pending changes on top of one base snapshot.
///
/// A batch holds the store's writer permit. Dropping it without
/// committing discards every change and releases the permit.
#[derive(Debug)]
pub struct WriteBatch {
    base: Arc<Snapshot>,
    working: Snapshot,
    mutations: Vec<Mutation>,
    row_keys: Arc<AtomicU64>,
    permit: WriterPermit,
}

impl WriteBatch {
    pub(crate) fn new(base: Arc<Snapshot>, row_keys: Arc<AtomicU64>, permit: WriterPermit) -> Self {
        let mut working = (*base).clone();
        // Keys handed out by rolled-back batches stay burned.
        let next = row_keys
            .fetch_max(working.next_row_key(), Ordering::SeqCst)
            .max(working.next_row_key());
        working.set_next_row_key(next);
        Self {
            base,
            working,
            mutations: Vec::new(),
            row_keys,
            permit,
        }
    }

    fn allocate_row_key(&mut self) -> RowKey {
        let key = self.row_keys.fetch_add(1, Ordering::SeqCst);
        self.working.set_next_row_key(key + 1);
        RowKey(key)
    }

    pub(crate) fn into_parts(self) -> (Arc<Snapshot>, Snapshot, Vec<Mutation>, WriterPermit) {
        (self.base, self.working, self.mutations, self.permit)
    }

    /// Returns the version this batch was started from.
    #[must_use]
    pub fn base_version(&self) -> Version {
        self.base.version()
    }

    /// Returns the snapshot the batch started from.
    #[must_use]
    pub fn base(&self) -> &Arc<Snapshot> {
        &self.base
    }

    /// Returns the snapshot including every change made so far.
    #[must_use]
    pub fn view(&self) -> &Snapshot {
        &self.working
    }

    /// Returns true if nothing has been changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Returns the number of recorded mutations.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.len()
    }

    fn record(&mut self, mutation: Mutation) -> EngineResult<()> {
        self.working.apply(&mutation)?;
        self.mutations.push(mutation);
        Ok(())
    }

    /// Creates or extends tables and records `version` as schema version.
    pub fn apply_schema(&mut self, schema: &Schema, version: u64) -> EngineResult<()> {
        let stored = self.working.schema();
        let mut merged = Schema::new();
        for table in stored.tables() {
            merged = merged.table(schema.get(&table.name).unwrap_or(table).clone());
        }
        for table in schema.tables() {
            if merged.get(&table.name).is_none() {
                merged = merged.table(table.clone());
            }
        }
        merged.validate().map_err(EngineError::schema_mismatch)?;
        self.record(Mutation::ApplySchema {
            schema: schema.clone(),
            version,
        })
    }

    /// Inserts a row. Unspecified properties get their type's default.
    ///
    /// # Errors
    ///
    /// Fails on unknown properties, type mismatches, dangling links and
    /// duplicate primary keys.
    pub fn create_row(
        &mut self,
        table: TableId,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> EngineResult<RowKey> {
        let schema = self
            .working
            .table_schema(table)
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))?
            .clone();
        let mut supplied: BTreeMap<String, Value> = values.into_iter().collect();
        let mut row = BTreeMap::new();
        for property in &schema.properties {
            let value = supplied
                .remove(&property.name)
                .unwrap_or_else(|| property.kind.default_value(property.optional));
            self.check_value(&schema.name, property, &value)?;
            row.insert(property.name.clone(), value);
        }
        if let Some(unknown) = supplied.into_keys().next() {
            return Err(EngineError::property_not_found(&schema.name, unknown));
        }
        if let Some(pk) = schema.primary_key() {
            let value = row.get(&pk.name).cloned().unwrap_or_default();
            if self.working.find_by_primary_key(table, &value).is_some() {
                return Err(EngineError::DuplicatePrimaryKey {
                    table: schema.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        let key = self.allocate_row_key();
        self.record(Mutation::CreateRow {
            table,
            row: key,
            values: row,
        })?;
        Ok(key)
    }

    /// Overwrites one property of an existing row.
    pub fn set_value(
        &mut self,
        table: TableId,
        row: RowKey,
        property: &str,
        value: Value,
    ) -> EngineResult<()> {
        let schema = self
            .working
            .table_schema(table)
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))?;
        let name = schema.name.clone();
        let declared = schema
            .property(property)
            .ok_or_else(|| EngineError::property_not_found(&name, property))?
            .clone();
        if !self.working.contains_row(table, row) {
            return Err(EngineError::RowNotFound { table: name, row });
        }
        if declared.primary_key {
            if self.working.value(table, row, property) == Some(&value) {
                return Ok(());
            }
            return Err(EngineError::invalid_operation(format!(
                "primary key {name}.{property} cannot be changed"
            )));
        }
        self.check_value(&name, &declared, &value)?;
        self.record(Mutation::SetValue {
            table,
            row,
            property: property.to_string(),
            value,
        })
    }

    /// Removes a row.
    pub fn remove_row(&mut self, table: TableId, row: RowKey) -> EngineResult<()> {
        let name = self
            .working
            .table_name(table)
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))?
            .to_string();
        if !self.working.contains_row(table, row) {
            return Err(EngineError::RowNotFound { table: name, row });
        }
        self.record(Mutation::RemoveRow { table, row })
    }

    /// Returns the elements of a list property.
    pub fn list(&self, table: TableId, row: RowKey, property: &str) -> EngineResult<Vec<RowKey>> {
        let name = self
            .working
            .table_name(table)
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))?;
        match self.working.value(table, row, property) {
            Some(Value::List(keys)) => Ok(keys.clone()),
            Some(_) => Err(EngineError::TypeMismatch {
                table: name.to_string(),
                property: property.to_string(),
                expected: "list".to_string(),
            }),
            None if self.working.contains_row(table, row) => {
                Err(EngineError::property_not_found(name, property))
            }
            None => Err(EngineError::RowNotFound {
                table: name.to_string(),
                row,
            }),
        }
    }

    /// Inserts `target` at `index` of a list property.
    pub fn list_insert(
        &mut self,
        table: TableId,
        row: RowKey,
        property: &str,
        index: usize,
        target: RowKey,
    ) -> EngineResult<()> {
        let mut keys = self.list(table, row, property)?;
        if index > keys.len() {
            return Err(out_of_range(index, keys.len()));
        }
        keys.insert(index, target);
        self.set_value(table, row, property, Value::List(keys))
    }

    /// Removes the element at `index` of a list property.
    pub fn list_remove(
        &mut self,
        table: TableId,
        row: RowKey,
        property: &str,
        index: usize,
    ) -> EngineResult<RowKey> {
        let mut keys = self.list(table, row, property)?;
        if index >= keys.len() {
            return Err(out_of_range(index, keys.len()));
        }
        let removed = keys.remove(index);
        self.set_value(table, row, property, Value::List(keys))?;
        Ok(removed)
    }

    /// Moves the element at `from` so it ends up at `to`.
    pub fn list_move(
        &mut self,
        table: TableId,
        row: RowKey,
        property: &str,
        from: usize,
        to: usize,
    ) -> EngineResult<()> {
        let mut keys = self.list(table, row, property)?;
        if from >= keys.len() || to >= keys.len() {
            return Err(out_of_range(from.max(to), keys.len()));
        }
        if from == to {
            return Ok(());
        }
        let key = keys.remove(from);
        keys.insert(to, key);
        self.set_value(table, row, property, Value::List(keys))
    }

    fn check_value(&self, table: &str, property: &Property, value: &Value) -> EngineResult<()> {
        if !property.kind.accepts(value, property.optional) {
            return Err(EngineError::TypeMismatch {
                table: table.to_string(),
                property: property.name.clone(),
                expected: property.kind.to_string(),
            });
        }
        let targets: &[RowKey] = match (&property.kind, value) {
            (PropertyType::Link { .. }, Value::Link(key)) => std::slice::from_ref(key),
            (PropertyType::List { .. }, Value::List(keys)) => keys,
            _ => return Ok(()),
        };
        let target_name = property.kind.target().unwrap_or_default();
        let target = self
            .working
            .table_id(target_name)
            .ok_or_else(|| EngineError::table_not_found(target_name))?;
        if let Some(missing) = targets
            .iter()
            .find(|key| !self.working.contains_row(target, **key))
        {
            return Err(EngineError::RowNotFound {
                table: target_name.to_string(),
                row: *missing,
            });
        }
        Ok(())
    }
}

fn out_of_range(index: usize, len: usize) -> EngineError {
    EngineError::invalid_operation(format!("list index {index} out of range for length {len}"))
}
