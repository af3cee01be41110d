//! Predicate queries.
//!
//! A [`Predicate`] is a small AST over property values. Compiling it
//! against a snapshot checks every property name and type once, so
//! evaluation never fails: rows whose values cannot be compared simply do
//! not match.

use crate::error::{EngineError, EngineResult};
use crate::schema::TableSchema;
use crate::snapshot::{Row, Snapshot};
use crate::types::{RowKey, TableId};
use crate::value::{PropertyType, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filter condition over the properties of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Property equals value.
    Eq(String, Value),
    /// Property differs from value.
    Ne(String, Value),
    /// Property is less than value.
    Lt(String, Value),
    /// Property is less than or equal to value.
    Le(String, Value),
    /// Property is greater than value.
    Gt(String, Value),
    /// Property is greater than or equal to value.
    Ge(String, Value),
    /// Text property contains the substring.
    Contains(String, String),
    /// Both predicates match.
    And(Box<Predicate>, Box<Predicate>),
    /// Either predicate matches.
    Or(Box<Predicate>, Box<Predicate>),
    /// The predicate does not match.
    Not(Box<Predicate>),
}

impl Predicate {
    /// `property == value`
    pub fn equals(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(property.into(), value.into())
    }

    /// `property != value`
    pub fn not_equals(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(property.into(), value.into())
    }

    /// `property < value`
    pub fn less_than(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(property.into(), value.into())
    }

    /// `property <= value`
    pub fn at_most(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Le(property.into(), value.into())
    }

    /// `property > value`
    pub fn greater_than(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(property.into(), value.into())
    }

    /// `property >= value`
    pub fn at_least(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ge(property.into(), value.into())
    }

    /// Text property contains `needle`.
    pub fn contains(property: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains(property.into(), needle.into())
    }

    /// Both `self` and `other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, p) | (p, Self::True) => p,
            (a, b) => Self::And(Box::new(a), Box::new(b)),
        }
    }

    /// Either `self` or `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Negation of `self`.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn check(&self, schema: &TableSchema) -> EngineResult<()> {
        match self {
            Self::True => Ok(()),
            Self::Eq(property, value) | Self::Ne(property, value) => {
                let declared = lookup(schema, property)?;
                if matches!(declared.kind, PropertyType::List { .. })
                    || !declared.kind.accepts(value, true)
                {
                    return Err(mismatch(schema, property, &declared.kind));
                }
                Ok(())
            }
            Self::Lt(property, value)
            | Self::Le(property, value)
            | Self::Gt(property, value)
            | Self::Ge(property, value) => {
                let declared = lookup(schema, property)?;
                if !declared.kind.is_scalar() || !declared.kind.accepts(value, true) {
                    return Err(mismatch(schema, property, &declared.kind));
                }
                Ok(())
            }
            Self::Contains(property, _) => {
                let declared = lookup(schema, property)?;
                if declared.kind != PropertyType::Text {
                    return Err(mismatch(schema, property, &declared.kind));
                }
                Ok(())
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.check(schema)?;
                b.check(schema)
            }
            Self::Not(p) => p.check(schema),
        }
    }

    /// Returns true if `row` satisfies the predicate.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let field = |property: &str| row.get(property).unwrap_or(&Value::Null);
        let ordered = |property: &str, value: &Value, accept: fn(Ordering) -> bool| {
            field(property).compare(value).is_some_and(accept)
        };
        match self {
            Self::True => true,
            Self::Eq(property, value) => field(property) == value,
            Self::Ne(property, value) => field(property) != value,
            Self::Lt(property, value) => ordered(property, value, Ordering::is_lt),
            Self::Le(property, value) => ordered(property, value, Ordering::is_le),
            Self::Gt(property, value) => ordered(property, value, Ordering::is_gt),
            Self::Ge(property, value) => ordered(property, value, Ordering::is_ge),
            Self::Contains(property, needle) => field(property)
                .as_text()
                .is_some_and(|text| text.contains(needle.as_str())),
            Self::And(a, b) => a.matches(row) && b.matches(row),
            Self::Or(a, b) => a.matches(row) || b.matches(row),
            Self::Not(p) => !p.matches(row),
        }
    }
}

fn lookup<'a>(schema: &'a TableSchema, property: &str) -> EngineResult<&'a crate::schema::Property> {
    schema
        .property(property)
        .ok_or_else(|| EngineError::property_not_found(&schema.name, property))
}

fn mismatch(schema: &TableSchema, property: &str, kind: &PropertyType) -> EngineError {
    EngineError::TypeMismatch {
        table: schema.name.clone(),
        property: property.to_string(),
        expected: format!("a value comparable with {kind}"),
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Property to sort by.
    pub property: String,
    /// Ascending if true.
    pub ascending: bool,
}

impl SortDescriptor {
    /// Ascending order on `property`.
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }

    /// Descending order on `property`.
    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: false,
        }
    }
}

/// A predicate and sort order checked against one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    table: TableId,
    predicate: Predicate,
    sort: Vec<SortDescriptor>,
}

impl CompiledQuery {
    /// Checks `predicate` and `sort` against the table's schema.
    pub fn compile(
        snapshot: &Snapshot,
        table: TableId,
        predicate: Predicate,
        sort: Vec<SortDescriptor>,
    ) -> EngineResult<Self> {
        let schema = snapshot
            .table_schema(table)
            .ok_or_else(|| EngineError::table_not_found(table.to_string()))?;
        predicate.check(schema)?;
        for descriptor in &sort {
            let declared = lookup(schema, &descriptor.property)?;
            if matches!(declared.kind, PropertyType::List { .. }) {
                return Err(mismatch(schema, &descriptor.property, &declared.kind));
            }
        }
        Ok(Self {
            table,
            predicate,
            sort,
        })
    }

    /// Every row of `table` in native order.
    #[must_use]
    pub const fn all(table: TableId) -> Self {
        Self {
            table,
            predicate: Predicate::True,
            sort: Vec::new(),
        }
    }

    /// Returns the queried table.
    #[must_use]
    pub const fn table(&self) -> TableId {
        self.table
    }

    /// Returns the predicate.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Returns the sort descriptors.
    #[must_use]
    pub fn sort(&self) -> &[SortDescriptor] {
        &self.sort
    }

    /// Narrows the query with another predicate.
    pub fn refine(&self, snapshot: &Snapshot, predicate: Predicate) -> EngineResult<Self> {
        Self::compile(
            snapshot,
            self.table,
            self.predicate.clone().and(predicate),
            self.sort.clone(),
        )
    }

    /// Replaces the sort order.
    pub fn sorted(&self, snapshot: &Snapshot, sort: Vec<SortDescriptor>) -> EngineResult<Self> {
        Self::compile(snapshot, self.table, self.predicate.clone(), sort)
    }

    /// Evaluates the query over every row of its table.
    #[must_use]
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<RowKey> {
        self.evaluate_within(snapshot, snapshot.keys(self.table))
    }

    /// Evaluates the query over `candidates`, keeping their order as the
    /// base order for sorting. Missing rows are skipped.
    #[must_use]
    pub fn evaluate_within(
        &self,
        snapshot: &Snapshot,
        candidates: impl IntoIterator<Item = RowKey>,
    ) -> Vec<RowKey> {
        let mut matched: Vec<(RowKey, &Row)> = candidates
            .into_iter()
            .filter_map(|key| snapshot.row(self.table, key).map(|row| (key, row.as_ref())))
            .filter(|(_, row)| self.predicate.matches(row))
            .collect();
        if !self.sort.is_empty() {
            matched.sort_by(|(_, a), (_, b)| self.compare_rows(a, b));
        }
        matched.into_iter().map(|(key, _)| key).collect()
    }

    fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        for descriptor in &self.sort {
            let left = a.get(&descriptor.property).unwrap_or(&Value::Null);
            let right = b.get(&descriptor.property).unwrap_or(&Value::Null);
            let ordering = left.compare(right).unwrap_or(Ordering::Equal);
            let ordering = if descriptor.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Property, Schema};
    use crate::write::Mutation;
    use std::collections::BTreeMap;

    fn snapshot() -> (Snapshot, TableId) {
        let mut snap = Snapshot::empty();
        snap.apply(&Mutation::ApplySchema {
            schema: Schema::new().table(
                TableSchema::new("Person")
                    .with(Property::text("name"))
                    .with(Property::int("age").optional()),
            ),
            version: 1,
        })
        .unwrap();
        let table = snap.table_id("Person").unwrap();
        let people: [(&str, Option<i64>); 4] = [
            ("Carol", Some(41)),
            ("alice", Some(30)),
            ("Bob", None),
            ("Dave", Some(30)),
        ];
        for (i, (name, age)) in people.into_iter().enumerate() {
            let mut values = BTreeMap::new();
            values.insert("name".to_string(), Value::from(name));
            values.insert("age".to_string(), Value::from(age));
            snap.apply(&Mutation::CreateRow {
                table,
                row: RowKey(i as u64 + 1),
                values,
            })
            .unwrap();
        }
        (snap, table)
    }

    #[test]
    fn default_order_is_row_key() {
        let (snap, table) = snapshot();
        let keys = CompiledQuery::all(table).evaluate(&snap);
        assert_eq!(keys, vec![RowKey(1), RowKey(2), RowKey(3), RowKey(4)]);
    }

    #[test]
    fn range_predicates_skip_nulls() {
        let (snap, table) = snapshot();
        let query =
            CompiledQuery::compile(&snap, table, Predicate::at_least("age", 30), vec![]).unwrap();
        assert_eq!(query.evaluate(&snap), vec![RowKey(1), RowKey(2), RowKey(4)]);

        let query =
            CompiledQuery::compile(&snap, table, Predicate::equals("age", Value::Null), vec![])
                .unwrap();
        assert_eq!(query.evaluate(&snap), vec![RowKey(3)]);
    }

    #[test]
    fn sort_is_stable_and_nulls_first() {
        let (snap, table) = snapshot();
        let query = CompiledQuery::compile(
            &snap,
            table,
            Predicate::True,
            vec![SortDescriptor::ascending("age")],
        )
        .unwrap();
        assert_eq!(
            query.evaluate(&snap),
            vec![RowKey(3), RowKey(2), RowKey(4), RowKey(1)]
        );

        let query = query
            .sorted(&snap, vec![SortDescriptor::descending("age")])
            .unwrap();
        assert_eq!(
            query.evaluate(&snap),
            vec![RowKey(1), RowKey(2), RowKey(4), RowKey(3)]
        );
    }

    #[test]
    fn combinators() {
        let (snap, table) = snapshot();
        let predicate = Predicate::contains("name", "a")
            .and(Predicate::less_than("age", 40))
            .or(Predicate::equals("name", "Bob"));
        let query = CompiledQuery::compile(&snap, table, predicate, vec![]).unwrap();
        assert_eq!(query.evaluate(&snap), vec![RowKey(2), RowKey(3), RowKey(4)]);

        let negated = CompiledQuery::compile(
            &snap,
            table,
            Predicate::equals("name", "Bob").negate(),
            vec![],
        )
        .unwrap();
        assert_eq!(negated.evaluate(&snap).len(), 3);
    }

    #[test]
    fn refine_narrows() {
        let (snap, table) = snapshot();
        let query = CompiledQuery::compile(&snap, table, Predicate::equals("age", 30), vec![])
            .unwrap()
            .refine(&snap, Predicate::equals("name", "Dave"))
            .unwrap();
        assert_eq!(query.evaluate(&snap), vec![RowKey(4)]);
    }

    #[test]
    fn evaluate_within_keeps_candidate_order() {
        let (snap, table) = snapshot();
        let query =
            CompiledQuery::compile(&snap, table, Predicate::equals("age", 30), vec![]).unwrap();
        let keys = query.evaluate_within(&snap, [RowKey(4), RowKey(9), RowKey(2)]);
        assert_eq!(keys, vec![RowKey(4), RowKey(2)]);
    }

    #[test]
    fn compile_rejects_bad_properties() {
        let (snap, table) = snapshot();
        let err =
            CompiledQuery::compile(&snap, table, Predicate::equals("height", 3), vec![]).unwrap_err();
        assert!(matches!(err, EngineError::PropertyNotFound { .. }));

        let err = CompiledQuery::compile(&snap, table, Predicate::contains("age", "3"), vec![])
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));

        let err =
            CompiledQuery::compile(&snap, table, Predicate::less_than("name", 3), vec![])
                .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }
}
