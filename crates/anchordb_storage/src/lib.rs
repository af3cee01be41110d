//! # AnchorDB Storage
//!
//! Journal backends for AnchorDB.
//!
//! A journal is an append-only sequence of **opaque frames**. The engine
//! writes one frame per commit and replays them in order when a store is
//! opened. Backends never interpret frame contents.
//!
//! ## Available Journals
//!
//! - [`InMemoryJournal`] - For tests and in-memory stores
//! - [`FileJournal`] - A single locked file on disk
//! - [`SealedJournal`] - Wrapper that seals every frame with AES-256-GCM
//!
//! ## Example
//!
//! ```rust
//! use anchordb_storage::{InMemoryJournal, Journal};
//!
//! let mut journal = InMemoryJournal::new();
//! journal.append(b"first").unwrap();
//! journal.append(b"second").unwrap();
//! assert_eq!(journal.frames().unwrap(), vec![b"first".to_vec(), b"second".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod frame;
mod journal;
mod memory;
mod sealed;

pub use error::{StorageError, StorageResult};
pub use file::FileJournal;
pub use frame::{compute_crc32, decode_frames, encode_frame, FRAME_HEADER_SIZE};
pub use journal::Journal;
pub use memory::InMemoryJournal;
pub use sealed::{SealedJournal, SealingKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
