//! # AnchorDB
//!
//! Thread-confined sessions over an embedded MVCC object store, with live
//! collections, change notifications and cross-thread handover.
//!
//! This crate provides:
//! - [`Session`]s that pin one snapshot and advance on refresh or commit
//! - [`ObjectRef`] handles and auto-updating [`LiveCollection`]s
//! - Fine-grained [`ChangeSet`]s delivered to subscribers
//! - [`ThreadSafeReference`] packages to move objects and collections
//!   between threads
//! - Background writes through [`run_on_worker`]
//!
//! ```rust,ignore
//! use anchordb::{Config, Predicate, Property, Schema, Session, TableSchema};
//!
//! let schema = Schema::new().table(
//!     TableSchema::new("Dog")
//!         .with(Property::text("name"))
//!         .with(Property::int("age")),
//! );
//! let session = Session::open(Config::in_memory("dogs").schema(schema).schema_version(1))?;
//!
//! let puppies = session.filter("Dog", Predicate::less_than("age", 2))?;
//! let _token = puppies.subscribe(|dogs, notification| {
//!     println!("{} puppies: {notification:?}", dogs.len().unwrap_or(0));
//! })?;
//!
//! session.write(|s| s.create("Dog", [("name", "Rex".into()), ("age", 1i64.into())]))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod collection;
mod config;
mod error;
mod handover;
mod migration;
mod model;
mod notify;
mod object;
mod session;
mod staging;
mod worker;
mod write;

pub use changeset::{ChangeSet, CollectionChange, Move};
pub use collection::LiveCollection;
pub use config::{Config, MigrationCallback};
pub use error::{Error, Result, WriteError};
pub use handover::{Handover, HandoverKind, ThreadSafeReference};
pub use migration::Migration;
pub use model::{Fields, Model};
pub use notify::{Notification, NotificationToken};
pub use object::{DynamicObject, ObjectRef};
pub use session::Session;
pub use staging::{AttachedGraph, NodeId, ObjectGraph};
pub use worker::{run_on_worker, WorkerTask};
pub use write::WriteScope;

pub use anchordb_engine::{
    Identity, Predicate, Property, PropertyType, RowKey, Schema, SortDescriptor, TableId,
    TableSchema, Version, Value, KEY_SIZE,
};
