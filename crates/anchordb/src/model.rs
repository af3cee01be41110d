//! Typed models.
//!
//! A [`Model`] maps a Rust type onto one table. Implementations write
//! their fields into a [`Fields`] map when added, and read them back from
//! an [`ObjectRef`].
//!
//! # Example
//!
//! ```rust,ignore
//! use anchordb::{Fields, Model, ObjectRef, Property, Result, TableSchema};
//!
//! struct Dog {
//!     name: String,
//! }
//!
//! impl Model for Dog {
//!     const TABLE: &'static str = "Dog";
//!
//!     fn schema() -> TableSchema {
//!         TableSchema::new(Self::TABLE).with(Property::text("name"))
//!     }
//!
//!     fn write_to(&self, fields: &mut Fields) {
//!         fields.set("name", self.name.as_str());
//!     }
//!
//!     fn read_from(object: &ObjectRef) -> Result<Self> {
//!         Ok(Dog {
//!             name: object.get_text("name")?.unwrap_or_default(),
//!         })
//!     }
//! }
//! ```

use crate::error::Result;
use crate::object::ObjectRef;
use anchordb_engine::{TableSchema, Value};

/// Property values for a new row, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    values: Vec<(String, Value)>,
}

impl Fields {
    /// Creates an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property. A later set of the same name wins.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    /// Iterates over the fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Consumes the map.
    #[must_use]
    pub fn into_values(self) -> Vec<(String, Value)> {
        self.values
    }
}

/// A Rust type stored as rows of one table.
pub trait Model: Sized {
    /// Table name.
    const TABLE: &'static str;

    /// Table definition, used to build the session schema.
    fn schema() -> TableSchema;

    /// Writes the model's scalar and link fields.
    fn write_to(&self, fields: &mut Fields);

    /// Reads a model back from a managed row.
    fn read_from(object: &ObjectRef) -> Result<Self>;
}
