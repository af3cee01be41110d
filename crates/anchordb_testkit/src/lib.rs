//! # AnchorDB Testkit
//!
//! Test utilities for AnchorDB.
//!
//! This crate provides:
//! - Session fixtures over temporary files and uniquely named in-memory
//!   stores
//! - A small `Person`/`Dog` model pair used across the integration tests
//! - Property-based generators for collection edits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use anchordb_testkit::prelude::*;
//!
//! #[test]
//! fn dogs_are_counted() {
//!     let fixture = TestStore::memory();
//!     let session = fixture.open();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod models;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::models::*;
}

pub use fixtures::*;
pub use generators::*;
pub use models::*;
