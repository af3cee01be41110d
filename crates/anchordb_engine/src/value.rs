//! Property values and property types.

use crate::types::RowKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single property value stored in a row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absent value. Only valid for optional properties and links.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Link to a row of the property's target table.
    Link(RowKey),
    /// Ordered list of rows of the property's target table.
    List(Vec<RowKey>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the linked row, if this is a non-null link.
    #[must_use]
    pub const fn as_link(&self) -> Option<RowKey> {
        match self {
            Self::Link(key) => Some(*key),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[RowKey]> {
        match self {
            Self::List(keys) => Some(keys),
            _ => None,
        }
    }

    /// Returns the type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Link(_) => "link",
            Self::List(_) => "list",
        }
    }

    /// Orders two values for sorting and range predicates.
    ///
    /// Null sorts before everything. Values of different kinds are not
    /// comparable and return `None`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Link(a), Self::Link(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Link(key) => write!(f, "{key}"),
            Self::List(keys) => write!(f, "[{} rows]", keys.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<RowKey> for Value {
    fn from(key: RowKey) -> Self {
        Self::Link(key)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Bytes,
    /// Nullable link to a row of `target`.
    Link {
        /// Target table name.
        target: String,
    },
    /// Ordered list of rows of `target`.
    List {
        /// Target table name.
        target: String,
    },
}

impl PropertyType {
    /// Returns the table a link or list points at.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Link { target } | Self::List { target } => Some(target),
            _ => None,
        }
    }

    /// Returns true if the type holds a single comparable value.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Text | Self::Bytes)
    }

    /// Returns true if `value` has the right shape for this type.
    ///
    /// Link targets are not checked here; the write path resolves them
    /// against the snapshot.
    #[must_use]
    pub fn accepts(&self, value: &Value, optional: bool) -> bool {
        match (self, value) {
            (Self::Link { .. }, Value::Null) => true,
            (Self::List { .. }, Value::Null) => false,
            (_, Value::Null) => optional,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Text, Value::Text(_))
            | (Self::Bytes, Value::Bytes(_))
            | (Self::Link { .. }, Value::Link(_))
            | (Self::List { .. }, Value::List(_)) => true,
            _ => false,
        }
    }

    /// Returns the value a new row gets when none is supplied.
    #[must_use]
    pub fn default_value(&self, optional: bool) -> Value {
        if optional {
            return match self {
                Self::List { .. } => Value::List(Vec::new()),
                _ => Value::Null,
            };
        }
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Text => Value::Text(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::Link { .. } => Value::Null,
            Self::List { .. } => Value::List(Vec::new()),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Text => f.write_str("text"),
            Self::Bytes => f.write_str("bytes"),
            Self::Link { target } => write!(f, "link<{target}>"),
            Self::List { target } => write!(f, "list<{target}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_first() {
        assert_eq!(Value::Null.compare(&Value::Int(-5)), Some(Ordering::Less));
        assert_eq!(Value::Int(2).compare(&Value::Null), Some(Ordering::Greater));
        assert_eq!(Value::Null.compare(&Value::Null), Some(Ordering::Equal));
    }

    #[test]
    fn mixed_kinds_do_not_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Text("1".into())), None);
    }

    #[test]
    fn accepts_matches_kind() {
        let link = PropertyType::Link {
            target: "Dog".into(),
        };
        assert!(link.accepts(&Value::Null, false));
        assert!(link.accepts(&Value::Link(RowKey(3)), false));
        assert!(!link.accepts(&Value::Int(3), false));

        assert!(!PropertyType::Int.accepts(&Value::Null, false));
        assert!(PropertyType::Int.accepts(&Value::Null, true));
        assert!(!PropertyType::Text.accepts(&Value::Int(1), true));
    }

    #[test]
    fn defaults() {
        assert_eq!(PropertyType::Int.default_value(false), Value::Int(0));
        assert_eq!(PropertyType::Int.default_value(true), Value::Null);
        let list = PropertyType::List {
            target: "Dog".into(),
        };
        assert_eq!(list.default_value(true), Value::List(vec![]));
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
