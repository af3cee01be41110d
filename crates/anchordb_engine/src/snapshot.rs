//! Immutable, versioned views of every table.
//!
//! Snapshots share row storage through `Arc`s. A write batch clones the
//! latest snapshot and mutates its copy with `Arc::make_mut`, so only the
//! tables and rows it touches are duplicated. Published snapshots are
//! never mutated again.

use crate::error::{EngineError, EngineResult};
use crate::schema::{Schema, TableSchema};
use crate::types::{RowKey, TableId, Version};
use crate::value::Value;
use crate::write::Mutation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Property values of one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub(crate) fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Returns the value of `property`.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Iterates over all property values.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn references(&self, property: &str, row: RowKey) -> bool {
        match self.values.get(property) {
            Some(Value::Link(key)) => *key == row,
            Some(Value::List(keys)) => keys.contains(&row),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Table {
    id: TableId,
    schema: Arc<TableSchema>,
    rows: Arc<BTreeMap<RowKey, Arc<Row>>>,
}

/// A consistent, immutable view of the store at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: Version,
    schema_version: u64,
    next_row_key: u64,
    tables: Vec<Table>,
}

impl Snapshot {
    pub(crate) fn empty() -> Self {
        Self {
            version: Version(0),
            schema_version: 0,
            next_row_key: 1,
            tables: Vec::new(),
        }
    }

    /// Returns the snapshot version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the schema version recorded by the last schema change.
    #[must_use]
    pub const fn schema_version(&self) -> u64 {
        self.schema_version
    }

    pub(crate) const fn next_row_key(&self) -> u64 {
        self.next_row_key
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub(crate) fn set_next_row_key(&mut self, next: u64) {
        self.next_row_key = next;
    }

    /// Returns the ID of the table called `name`.
    #[must_use]
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|t| t.schema.name == name)
            .map(|t| t.id)
    }

    /// Returns the name of a table.
    #[must_use]
    pub fn table_name(&self, table: TableId) -> Option<&str> {
        self.tables.get(table.index()).map(|t| t.schema.name.as_str())
    }

    /// Returns the schema of a table.
    #[must_use]
    pub fn table_schema(&self, table: TableId) -> Option<&TableSchema> {
        self.tables.get(table.index()).map(|t| t.schema.as_ref())
    }

    /// Returns the schema of every table.
    #[must_use]
    pub fn schema(&self) -> Schema {
        self.tables
            .iter()
            .fold(Schema::new(), |schema, t| schema.table((*t.schema).clone()))
    }

    /// Returns a row.
    #[must_use]
    pub fn row(&self, table: TableId, key: RowKey) -> Option<&Arc<Row>> {
        self.tables.get(table.index())?.rows.get(&key)
    }

    /// Returns true if the row exists in this snapshot.
    #[must_use]
    pub fn contains_row(&self, table: TableId, key: RowKey) -> bool {
        self.row(table, key).is_some()
    }

    /// Returns the value of one property of a row.
    #[must_use]
    pub fn value(&self, table: TableId, key: RowKey, property: &str) -> Option<&Value> {
        self.row(table, key)?.get(property)
    }

    /// Returns every row key of a table in ascending order.
    #[must_use]
    pub fn keys(&self, table: TableId) -> Vec<RowKey> {
        self.tables
            .get(table.index())
            .map(|t| t.rows.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Iterates over the rows of a table in ascending key order.
    pub fn rows(&self, table: TableId) -> impl Iterator<Item = (RowKey, &Arc<Row>)> {
        self.tables
            .get(table.index())
            .into_iter()
            .flat_map(|t| t.rows.iter().map(|(k, r)| (*k, r)))
    }

    /// Returns the number of rows in a table.
    #[must_use]
    pub fn len(&self, table: TableId) -> usize {
        self.tables.get(table.index()).map_or(0, |t| t.rows.len())
    }

    /// Returns true if the table has no rows or does not exist.
    #[must_use]
    pub fn is_empty(&self, table: TableId) -> bool {
        self.len(table) == 0
    }

    /// Finds the row whose primary key equals `value`.
    #[must_use]
    pub fn find_by_primary_key(&self, table: TableId, value: &Value) -> Option<RowKey> {
        let t = self.tables.get(table.index())?;
        let pk = t.schema.primary_key()?;
        t.rows
            .iter()
            .find(|(_, row)| row.get(&pk.name) == Some(value))
            .map(|(key, _)| *key)
    }

    /// Returns true if `key` holds the same values here and in `other`.
    ///
    /// Rows untouched between two snapshots share their `Arc`, which makes
    /// the common case a pointer comparison.
    #[must_use]
    pub fn same_row(&self, other: &Self, table: TableId, key: RowKey) -> bool {
        match (self.row(table, key), other.row(table, key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            (None, None) => true,
            _ => false,
        }
    }

    fn table_mut(&mut self, table: TableId) -> EngineResult<&mut Table> {
        self.tables
            .get_mut(table.index())
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))
    }

    /// Applies one mutation to this (unpublished) snapshot.
    pub(crate) fn apply(&mut self, mutation: &Mutation) -> EngineResult<()> {
        match mutation {
            Mutation::ApplySchema { schema, version } => {
                self.apply_schema(schema, *version);
                Ok(())
            }
            Mutation::CreateRow { table, row, values } => {
                let t = self.table_mut(*table)?;
                Arc::make_mut(&mut t.rows).insert(*row, Arc::new(Row::from_values(values.clone())));
                self.next_row_key = self.next_row_key.max(row.0 + 1);
                Ok(())
            }
            Mutation::SetValue {
                table,
                row,
                property,
                value,
            } => {
                let t = self.table_mut(*table)?;
                let entry = Arc::make_mut(&mut t.rows).get_mut(row).ok_or_else(|| {
                    EngineError::RowNotFound {
                        table: t.schema.name.clone(),
                        row: *row,
                    }
                })?;
                Arc::make_mut(entry)
                    .values
                    .insert(property.clone(), value.clone());
                Ok(())
            }
            Mutation::RemoveRow { table, row } => self.remove_row(*table, *row),
        }
    }

    fn apply_schema(&mut self, schema: &Schema, version: u64) {
        for requested in schema.tables() {
            match self.tables.iter_mut().find(|t| t.schema.name == requested.name) {
                Some(table) => {
                    if *table.schema == *requested {
                        continue;
                    }
                    for row in Arc::make_mut(&mut table.rows).values_mut() {
                        let mut values = BTreeMap::new();
                        for property in &requested.properties {
                            let kept = table
                                .schema
                                .property(&property.name)
                                .filter(|old| old.kind == property.kind)
                                .and_then(|_| row.get(&property.name))
                                .filter(|v| property.kind.accepts(v, property.optional))
                                .cloned();
                            values.insert(
                                property.name.clone(),
                                kept.unwrap_or_else(|| {
                                    property.kind.default_value(property.optional)
                                }),
                            );
                        }
                        *row = Arc::new(Row::from_values(values));
                    }
                    table.schema = Arc::new(requested.clone());
                }
                None => {
                    let id = TableId(self.tables.len() as u32);
                    self.tables.push(Table {
                        id,
                        schema: Arc::new(requested.clone()),
                        rows: Arc::new(BTreeMap::new()),
                    });
                }
            }
        }
        self.schema_version = version;
    }

    fn remove_row(&mut self, table: TableId, row: RowKey) -> EngineResult<()> {
        let t = self.table_mut(table)?;
        if Arc::make_mut(&mut t.rows).remove(&row).is_none() {
            return Err(EngineError::RowNotFound {
                table: t.schema.name.clone(),
                row,
            });
        }
        let target = t.schema.name.clone();

        // Links to the removed row become null and list entries disappear.
        for other in &mut self.tables {
            let referencing: Vec<String> = other
                .schema
                .properties
                .iter()
                .filter(|p| p.kind.target() == Some(target.as_str()))
                .map(|p| p.name.clone())
                .collect();
            if referencing.is_empty() {
                continue;
            }
            let affected: Vec<RowKey> = other
                .rows
                .iter()
                .filter(|(_, r)| referencing.iter().any(|p| r.references(p, row)))
                .map(|(k, _)| *k)
                .collect();
            if affected.is_empty() {
                continue;
            }
            let rows = Arc::make_mut(&mut other.rows);
            for key in affected {
                let Some(entry) = rows.get_mut(&key) else {
                    continue;
                };
                let entry = Arc::make_mut(entry);
                for property in &referencing {
                    let Some(value) = entry.values.get_mut(property) else {
                        continue;
                    };
                    if matches!(value, Value::Link(k) if *k == row) {
                        *value = Value::Null;
                    } else if let Value::List(keys) = value {
                        keys.retain(|k| *k != row);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Property;

    fn schema() -> Schema {
        Schema::new()
            .table(
                TableSchema::new("Person")
                    .with(Property::text("name"))
                    .with(Property::list("dogs", "Dog")),
            )
            .table(
                TableSchema::new("Dog")
                    .with(Property::text("name"))
                    .with(Property::link("owner", "Person")),
            )
    }

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn seeded() -> Snapshot {
        let mut snap = Snapshot::empty();
        snap.apply(&Mutation::ApplySchema {
            schema: schema(),
            version: 1,
        })
        .unwrap();
        let person = snap.table_id("Person").unwrap();
        let dog = snap.table_id("Dog").unwrap();
        snap.apply(&Mutation::CreateRow {
            table: dog,
            row: RowKey(1),
            values: values(&[("name", "Rex".into()), ("owner", Value::Null)]),
        })
        .unwrap();
        snap.apply(&Mutation::CreateRow {
            table: person,
            row: RowKey(2),
            values: values(&[
                ("name", "Ann".into()),
                ("dogs", Value::List(vec![RowKey(1)])),
            ]),
        })
        .unwrap();
        snap.apply(&Mutation::SetValue {
            table: dog,
            row: RowKey(1),
            property: "owner".into(),
            value: Value::Link(RowKey(2)),
        })
        .unwrap();
        snap
    }

    #[test]
    fn create_advances_row_counter() {
        let snap = seeded();
        assert_eq!(snap.next_row_key(), 3);
        assert_eq!(snap.len(snap.table_id("Person").unwrap()), 1);
    }

    #[test]
    fn remove_clears_links_and_list_entries() {
        let mut snap = seeded();
        let person = snap.table_id("Person").unwrap();
        let dog = snap.table_id("Dog").unwrap();

        snap.apply(&Mutation::RemoveRow {
            table: dog,
            row: RowKey(1),
        })
        .unwrap();
        assert_eq!(
            snap.value(person, RowKey(2), "dogs"),
            Some(&Value::List(vec![]))
        );

        let mut snap = seeded();
        snap.apply(&Mutation::RemoveRow {
            table: person,
            row: RowKey(2),
        })
        .unwrap();
        assert_eq!(snap.value(dog, RowKey(1), "owner"), Some(&Value::Null));
    }

    #[test]
    fn copies_do_not_affect_the_original() {
        let original = seeded();
        let dog = original.table_id("Dog").unwrap();
        let mut copy = original.clone();
        copy.apply(&Mutation::SetValue {
            table: dog,
            row: RowKey(1),
            property: "name".into(),
            value: "Max".into(),
        })
        .unwrap();

        assert_eq!(
            original.value(dog, RowKey(1), "name"),
            Some(&Value::Text("Rex".into()))
        );
        assert!(!original.same_row(&copy, dog, RowKey(1)));
        let person = original.table_id("Person").unwrap();
        assert!(original.same_row(&copy, person, RowKey(2)));
    }

    #[test]
    fn schema_change_keeps_compatible_values() {
        let mut snap = seeded();
        let person = snap.table_id("Person").unwrap();
        let updated = Schema::new().table(
            TableSchema::new("Person")
                .with(Property::text("name"))
                .with(Property::list("dogs", "Dog"))
                .with(Property::int("age")),
        );
        snap.apply(&Mutation::ApplySchema {
            schema: updated,
            version: 2,
        })
        .unwrap();

        assert_eq!(snap.schema_version(), 2);
        assert_eq!(
            snap.value(person, RowKey(2), "name"),
            Some(&Value::Text("Ann".into()))
        );
        assert_eq!(snap.value(person, RowKey(2), "age"), Some(&Value::Int(0)));
        assert!(snap.table_id("Dog").is_some());
    }

    #[test]
    fn remove_missing_row_fails() {
        let mut snap = seeded();
        let dog = snap.table_id("Dog").unwrap();
        let err = snap
            .apply(&Mutation::RemoveRow {
                table: dog,
                row: RowKey(99),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::RowNotFound { .. }));
    }
}
