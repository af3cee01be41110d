//! Handover payloads.
//!
//! A payload names an object, a list property or a query in a form that
//! is valid in every snapshot of the same store. It is exported as opaque
//! CBOR bytes and imported again on the receiving side.

use crate::error::{EngineError, EngineResult};
use crate::query::CompiledQuery;
use crate::snapshot::Snapshot;
use crate::types::{RowKey, TableId};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// What a handover package refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoverPayload {
    /// One row.
    Object {
        /// Table of the row.
        table: TableId,
        /// The row.
        row: RowKey,
    },
    /// A list property of one row.
    List {
        /// Table of the parent row.
        table: TableId,
        /// The parent row.
        row: RowKey,
        /// List property name.
        property: String,
        /// Optional filter applied over the list contents.
        query: Option<CompiledQuery>,
    },
    /// A table query.
    Query {
        /// The compiled query.
        query: CompiledQuery,
    },
}

impl HandoverPayload {
    /// Serializes the payload to opaque bytes.
    pub fn export(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| EngineError::codec(format!("export handover: {e}")))?;
        Ok(buf)
    }

    /// Imports a payload against `snapshot`.
    ///
    /// Returns `Ok(None)` when the referenced row, or a list's parent row,
    /// no longer exists there.
    pub fn import(bytes: &[u8], snapshot: &Snapshot) -> EngineResult<Option<Self>> {
        let payload: Self = ciborium::de::from_reader(bytes)
            .map_err(|e| EngineError::codec(format!("import handover: {e}")))?;
        let present = match &payload {
            Self::Object { table, row } => snapshot.contains_row(*table, *row),
            Self::List {
                table,
                row,
                property,
                ..
            } => matches!(
                snapshot.value(*table, *row, property),
                Some(Value::List(_))
            ),
            Self::Query { query } => snapshot.table_schema(query.table()).is_some(),
        };
        Ok(present.then_some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Property, Schema, TableSchema};
    use crate::write::Mutation;
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        let mut snap = Snapshot::empty();
        snap.apply(&Mutation::ApplySchema {
            schema: Schema::new().table(
                TableSchema::new("Folder")
                    .with(Property::text("title"))
                    .with(Property::list("children", "Folder")),
            ),
            version: 1,
        })
        .unwrap();
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), Value::from("root"));
        values.insert("children".to_string(), Value::List(vec![]));
        snap.apply(&Mutation::CreateRow {
            table: TableId(0),
            row: RowKey(1),
            values,
        })
        .unwrap();
        snap
    }

    #[test]
    fn object_payload_resolves_while_row_exists() {
        let mut snap = snapshot();
        let bytes = HandoverPayload::Object {
            table: TableId(0),
            row: RowKey(1),
        }
        .export()
        .unwrap();
        assert!(HandoverPayload::import(&bytes, &snap).unwrap().is_some());

        snap.apply(&Mutation::RemoveRow {
            table: TableId(0),
            row: RowKey(1),
        })
        .unwrap();
        assert!(HandoverPayload::import(&bytes, &snap).unwrap().is_none());
    }

    #[test]
    fn list_payload_needs_list_property() {
        let snap = snapshot();
        let list = HandoverPayload::List {
            table: TableId(0),
            row: RowKey(1),
            property: "children".into(),
            query: None,
        };
        let imported = HandoverPayload::import(&list.export().unwrap(), &snap).unwrap();
        assert_eq!(imported, Some(list));

        let wrong = HandoverPayload::List {
            table: TableId(0),
            row: RowKey(1),
            property: "title".into(),
            query: None,
        };
        assert!(HandoverPayload::import(&wrong.export().unwrap(), &snap)
            .unwrap()
            .is_none());
    }

    #[test]
    fn corrupt_bytes_are_codec_errors() {
        let err = HandoverPayload::import(b"\xff\xfe", &snapshot()).unwrap_err();
        assert!(matches!(err, EngineError::Codec { .. }));
    }
}
