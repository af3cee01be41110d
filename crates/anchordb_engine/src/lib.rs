//! # AnchorDB Engine
//!
//! The storage-side collaborator of AnchorDB.
//!
//! This crate provides:
//! - Immutable, versioned [`Snapshot`]s of every table
//! - Single-writer [`WriteBatch`]es layered on the latest snapshot
//! - Commit journaling and replay through `anchordb_storage`
//! - Predicate queries compiled against a table ([`CompiledQuery`])
//! - Opaque handover payloads for objects, lists and queries
//! - A process-wide registry so every session on one identity shares a [`Store`]
//!
//! The binding layer (`anchordb`) owns thread affinity, live collections
//! and notifications; this crate only deals in snapshots and row keys.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod gate;
mod handover;
mod query;
mod record;
mod registry;
mod schema;
mod snapshot;
mod store;
mod types;
mod value;
mod write;

pub use error::{EngineError, EngineResult};
pub use handover::HandoverPayload;
pub use query::{CompiledQuery, Predicate, SortDescriptor};
pub use registry::{is_open, open_store};
pub use schema::{Property, Schema, SchemaChange, TableSchema};
pub use snapshot::{Row, Snapshot};
pub use store::{Identity, Store, StoreOptions, FORMAT_VERSION};
pub use types::{RowKey, TableId, Version};
pub use value::{PropertyType, Value};
pub use write::{Mutation, WriteBatch};

pub use anchordb_storage::{SealingKey, KEY_SIZE};
