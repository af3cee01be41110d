//! Moving objects and collections between threads.
//!
//! Sessions, objects and live collections are confined to the thread that
//! created them. To hand one to another thread, wrap it in a
//! [`ThreadSafeReference`], send the reference, and
//! [`resolve`](Session::resolve) it on a session of the same store there.
//!
//! A reference remembers the version its source session saw. A resolving
//! session that is behind that version refreshes first, so the receiver
//! never sees older data than the sender did. A reference can be resolved
//! once.

use crate::collection::{LiveCollection, Source};
use crate::error::{Error, Result};
use crate::object::ObjectRef;
use crate::session::Session;
use anchordb_engine::{HandoverPayload, Identity, Version};
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

mod sealed {
    pub trait Sealed {}
}

/// What a [`ThreadSafeReference`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoverKind {
    /// A single object.
    Object,
    /// A list property, possibly filtered or sorted.
    List,
    /// A query over a table.
    Query,
}

/// Types that can cross threads through a [`ThreadSafeReference`].
///
/// Implemented for [`ObjectRef`] and [`LiveCollection`] only.
pub trait Handover: sealed::Sealed + Sized {
    #[doc(hidden)]
    fn owner(&self) -> &Session;

    #[doc(hidden)]
    fn kind(&self) -> HandoverKind;

    #[doc(hidden)]
    fn payload(&self) -> Result<HandoverPayload>;

    #[doc(hidden)]
    fn materialize(session: &Session, payload: HandoverPayload) -> Result<Self>;
}

impl sealed::Sealed for ObjectRef {}

impl Handover for ObjectRef {
    fn owner(&self) -> &Session {
        self.session()
    }

    fn kind(&self) -> HandoverKind {
        HandoverKind::Object
    }

    fn payload(&self) -> Result<HandoverPayload> {
        if !self.is_valid() {
            return Err(Error::invalid_state("cannot hand over an invalid object"));
        }
        Ok(HandoverPayload::Object {
            table: self.table(),
            row: self.row_key(),
        })
    }

    fn materialize(session: &Session, payload: HandoverPayload) -> Result<Self> {
        match payload {
            HandoverPayload::Object { table, row } => Ok(ObjectRef::new(session.clone(), table, row)),
            other => Err(kind_mismatch(HandoverKind::Object, &other)),
        }
    }
}

impl sealed::Sealed for LiveCollection {}

impl Handover for LiveCollection {
    fn owner(&self) -> &Session {
        self.session()
    }

    fn kind(&self) -> HandoverKind {
        match self.handover_payload() {
            HandoverPayload::Query { .. } => HandoverKind::Query,
            _ => HandoverKind::List,
        }
    }

    fn payload(&self) -> Result<HandoverPayload> {
        if !self.is_valid() {
            return Err(Error::invalid_state(
                "cannot hand over an invalid collection",
            ));
        }
        Ok(self.handover_payload())
    }

    fn materialize(session: &Session, payload: HandoverPayload) -> Result<Self> {
        match payload {
            HandoverPayload::Query { query } => Ok(LiveCollection::for_query(session.clone(), query)),
            HandoverPayload::List {
                table,
                row,
                property,
                query,
            } => {
                let source = session
                    .with_view(|view, _| Source::list(view, table, row, &property, query))??;
                Ok(LiveCollection::from_source(session.clone(), source))
            }
            other => Err(kind_mismatch(HandoverKind::List, &other)),
        }
    }
}

fn kind_mismatch(expected: HandoverKind, payload: &HandoverPayload) -> Error {
    Error::invalid_state(format!(
        "handover package does not hold {expected:?}: {payload:?}"
    ))
}

/// A package that carries an object or collection to another thread.
///
/// The package is `Send + Sync` whatever it carries. It holds no session
/// state: only the store identity, the source version and an opaque
/// payload.
pub struct ThreadSafeReference<T> {
    kind: HandoverKind,
    identity: Identity,
    version: Version,
    payload: Mutex<Option<Vec<u8>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Handover> ThreadSafeReference<T> {
    /// Packages `source` for another thread.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the source's session is closed or inside
    /// a write, or if the source is no longer valid.
    pub fn new(source: &T) -> Result<Self> {
        let session = source.owner();
        if session.is_closed() {
            return Err(Error::invalid_state(
                "cannot hand over from a closed session",
            ));
        }
        if session.is_in_write() {
            return Err(Error::invalid_state("cannot hand over inside a write"));
        }
        let payload = source.payload()?;
        let bytes = payload.export()?;
        let version = session.version()?;
        let kind = source.kind();
        debug!(identity = %session.identity(), %version, ?kind, "handover package created");
        Ok(Self {
            kind,
            identity: session.identity().clone(),
            version,
            payload: Mutex::new(Some(bytes)),
            _marker: PhantomData,
        })
    }
}

impl<T> ThreadSafeReference<T> {
    /// Returns what the package carries.
    #[must_use]
    pub const fn kind(&self) -> HandoverKind {
        self.kind
    }

    /// Returns the identity of the source store.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the version the source session saw.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns true once the package has been resolved.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.payload.lock().is_none()
    }
}

impl<T> fmt::Debug for ThreadSafeReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSafeReference")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("version", &self.version)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

impl Session {
    /// Resolves a handover package on this session.
    ///
    /// Returns `Ok(None)` if the object, or a list's parent object, no
    /// longer exists at the version this session ends up on.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// - [`Error::ObjectDisposed`] if this session is closed
    /// - [`Error::InvalidTransaction`] inside a write
    /// - [`Error::ConfigurationMismatch`] if the package belongs to another
    ///   store; the package stays resolvable elsewhere
    /// - [`Error::AlreadyConsumed`] on a second resolve
    /// - [`Error::InvalidState`] if a refresh is needed but this is called
    ///   from a notification callback; the package is not consumed
    pub fn resolve<T: Handover>(&self, reference: &ThreadSafeReference<T>) -> Result<Option<T>> {
        self.ensure_open()?;
        if self.is_in_write() {
            return Err(Error::invalid_transaction(
                "cannot resolve a handover package inside a write",
            ));
        }
        if reference.identity != *self.identity() {
            return Err(Error::ConfigurationMismatch {
                expected: reference.identity.to_string(),
                actual: self.identity().to_string(),
            });
        }

        let needs_refresh = self.version()? < reference.version;
        let bytes = {
            let mut slot = reference.payload.lock();
            if slot.is_none() {
                return Err(Error::AlreadyConsumed);
            }
            if needs_refresh && self.is_delivering() {
                return Err(Error::invalid_state(
                    "resolving this package needs a refresh, which is not allowed during delivery",
                ));
            }
            slot.take().unwrap_or_default()
        };

        if needs_refresh {
            self.refresh()?;
        }
        let payload = self.with_view(|view, _| HandoverPayload::import(&bytes, view))??;
        debug!(
            identity = %self.identity(),
            version = %reference.version,
            kind = ?reference.kind,
            found = payload.is_some(),
            "handover package resolved"
        );
        payload.map(|payload| T::materialize(self, payload)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn packages_cross_threads() {
        assert_send_sync::<ThreadSafeReference<ObjectRef>>();
        assert_send_sync::<ThreadSafeReference<LiveCollection>>();
    }
}
