//! Write scopes.

use crate::error::Result;
use crate::session::Session;
use std::fmt;

/// An active write on a session.
///
/// Changes made through the session's handles while the scope is alive
/// are staged in the write. [`WriteScope::commit`] publishes them;
/// dropping the scope without committing rolls them back.
#[must_use = "a write scope rolls back when dropped"]
pub struct WriteScope<'s> {
    session: &'s Session,
    done: bool,
}

impl<'s> WriteScope<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            done: false,
        }
    }

    /// Returns the session the write belongs to.
    #[must_use]
    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Returns true until the scope commits or rolls back, or the session
    /// closes underneath it.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.done && self.session.is_in_write()
    }

    /// Commits the write, advances the session to the new snapshot and
    /// delivers notifications.
    ///
    /// # Errors
    ///
    /// [`Error::ObjectDisposed`](crate::Error::ObjectDisposed) if the
    /// session was closed, or the storage error that failed the commit.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        self.session.commit_write()
    }

    /// Discards the write.
    pub fn rollback(mut self) {
        self.done = true;
        self.session.rollback_write();
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.session.rollback_write();
        }
    }
}

impl fmt::Debug for WriteScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteScope")
            .field("identity", self.session.identity())
            .field("active", &self.is_active())
            .finish()
    }
}
