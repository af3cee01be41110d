//! Models shared by the integration tests.

use anchordb::{Fields, Model, ObjectRef, Property, Result, Schema, TableSchema};

/// A person with a primary key and a list of dogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i64,
}

impl Person {
    /// Creates a person.
    pub fn new(id: i64, name: &str, age: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            age,
        }
    }
}

impl Model for Person {
    const TABLE: &'static str = "Person";

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE)
            .with(Property::int("id").primary_key())
            .with(Property::text("name"))
            .with(Property::int("age"))
            .with(Property::list("dogs", Dog::TABLE))
    }

    fn write_to(&self, fields: &mut Fields) {
        fields
            .set("id", self.id)
            .set("name", self.name.as_str())
            .set("age", self.age);
    }

    fn read_from(object: &ObjectRef) -> Result<Self> {
        Ok(Self {
            id: object.get_int("id")?.unwrap_or_default(),
            name: object.get_text("name")?.unwrap_or_default(),
            age: object.get_int("age")?.unwrap_or_default(),
        })
    }
}

/// A dog, optionally linked to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dog {
    /// Name.
    pub name: String,
    /// Age in years.
    pub age: i64,
}

impl Dog {
    /// Creates a dog.
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_string(),
            age,
        }
    }
}

impl Model for Dog {
    const TABLE: &'static str = "Dog";

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE)
            .with(Property::text("name"))
            .with(Property::int("age"))
            .with(Property::link("owner", Person::TABLE))
    }

    fn write_to(&self, fields: &mut Fields) {
        fields.set("name", self.name.as_str()).set("age", self.age);
    }

    fn read_from(object: &ObjectRef) -> Result<Self> {
        Ok(Self {
            name: object.get_text("name")?.unwrap_or_default(),
            age: object.get_int("age")?.unwrap_or_default(),
        })
    }
}

/// The schema holding [`Person`] and [`Dog`].
pub fn schema() -> Schema {
    Schema::new().table(Person::schema()).table(Dog::schema())
}
