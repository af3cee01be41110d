//! Table schemas and schema comparison.

use crate::value::PropertyType;
use serde::{Deserialize, Serialize};

/// One declared property of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub kind: PropertyType,
    /// Whether the property accepts null.
    pub optional: bool,
    /// Whether the property is the table's primary key.
    pub primary_key: bool,
}

impl Property {
    /// Creates a required property.
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            primary_key: false,
        }
    }

    /// Boolean property.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Bool)
    }

    /// Integer property.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Int)
    }

    /// Text property.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Text)
    }

    /// Bytes property.
    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Bytes)
    }

    /// Link to a row of `target`.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyType::Link {
                target: target.into(),
            },
        )
    }

    /// List of rows of `target`.
    pub fn list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyType::List {
                target: target.into(),
            },
        )
    }

    /// Marks the property optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the property as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Properties in declaration order.
    pub properties: Vec<Property>,
}

impl TableSchema {
    /// Creates a table schema with no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the primary key property, if any.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Property> {
        self.properties.iter().find(|p| p.primary_key)
    }
}

/// A set of table schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    tables: Vec<TableSchema>,
}

/// One difference between a stored and a requested schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// A table the store does not have yet.
    AddTable {
        /// Table name.
        table: String,
    },
    /// A property the stored table does not have yet.
    AddProperty {
        /// Table name.
        table: String,
        /// Property name.
        property: String,
    },
    /// A stored property the requested schema no longer declares.
    RemoveProperty {
        /// Table name.
        table: String,
        /// Property name.
        property: String,
    },
    /// A property whose type, optionality or key flag changed.
    ChangeProperty {
        /// Table name.
        table: String,
        /// Property name.
        property: String,
    },
}

impl SchemaChange {
    /// Returns true if the change can be applied without a migration.
    #[must_use]
    pub const fn is_additive(&self) -> bool {
        matches!(self, Self::AddTable { .. } | Self::AddProperty { .. })
    }
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Returns all tables.
    #[must_use]
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns true if there are no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Lists the changes needed to go from `self` (stored) to `requested`.
    ///
    /// Stored tables the requested schema omits are not reported; a session
    /// may open a store with a subset of its tables.
    #[must_use]
    pub fn changes_to(&self, requested: &Self) -> Vec<SchemaChange> {
        let mut changes = Vec::new();
        for table in &requested.tables {
            let Some(stored) = self.get(&table.name) else {
                changes.push(SchemaChange::AddTable {
                    table: table.name.clone(),
                });
                continue;
            };
            for property in &table.properties {
                match stored.property(&property.name) {
                    None => changes.push(SchemaChange::AddProperty {
                        table: table.name.clone(),
                        property: property.name.clone(),
                    }),
                    Some(existing) if existing != property => {
                        changes.push(SchemaChange::ChangeProperty {
                            table: table.name.clone(),
                            property: property.name.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
            for property in &stored.properties {
                if table.property(&property.name).is_none() {
                    changes.push(SchemaChange::RemoveProperty {
                        table: table.name.clone(),
                        property: property.name.clone(),
                    });
                }
            }
        }
        changes
    }

    /// Checks that every link and list points at a declared table and that
    /// each table has at most one primary key.
    pub(crate) fn validate(&self) -> Result<(), String> {
        for table in &self.tables {
            if table.properties.iter().filter(|p| p.primary_key).count() > 1 {
                return Err(format!("{} declares more than one primary key", table.name));
            }
            for property in &table.properties {
                if let Some(target) = property.kind.target() {
                    if self.get(target).is_none() {
                        return Err(format!(
                            "{}.{} targets unknown table {target}",
                            table.name, property.name
                        ));
                    }
                    if property.primary_key {
                        return Err(format!(
                            "{}.{} cannot be a primary key",
                            table.name, property.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
