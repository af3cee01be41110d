//! Journal record encoding.
//!
//! The first frame of every journal is a [`JournalRecord::Header`]. Each
//! following frame is one [`JournalRecord::Commit`]. Records are CBOR.

use crate::error::{EngineError, EngineResult};
use crate::types::Version;
use crate::write::Mutation;
use serde::{Deserialize, Serialize};

pub(crate) const MAGIC: &str = "anchordb";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalRecord {
    Header {
        magic: String,
        format: (u16, u16),
    },
    Commit {
        version: Version,
        next_row_key: u64,
        mutations: Vec<Mutation>,
    },
}

impl JournalRecord {
    pub(crate) fn header(format: (u16, u16)) -> Self {
        Self::Header {
            magic: MAGIC.to_string(),
            format,
        }
    }

    pub(crate) fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| EngineError::codec(format!("encode journal record: {e}")))?;
        Ok(buf)
    }

    pub(crate) fn decode(bytes: &[u8]) -> EngineResult<Self> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| EngineError::codec(format!("decode journal record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RowKey, TableId};

    #[test]
    fn commit_survives_encoding() {
        let record = JournalRecord::Commit {
            version: Version(3),
            next_row_key: 9,
            mutations: vec![Mutation::RemoveRow {
                table: TableId(1),
                row: RowKey(8),
            }],
        };
        let bytes = record.encode().unwrap();
        assert_eq!(JournalRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = JournalRecord::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, EngineError::Codec { .. }));
    }
}
