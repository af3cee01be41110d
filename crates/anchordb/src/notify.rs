//! Change notifications.
//!
//! A subscription is created with [`LiveCollection::subscribe`] and lives
//! until its [`NotificationToken`] is disposed or dropped.
//!
//! Delivery convention: the first callback after subscribing receives
//! [`Notification::Initial`] at the session's next delivery point
//! (`refresh`, its own commit, `begin_write`, or `process_notifications`).
//! Every later callback receives either [`Notification::Changed`] with a
//! non-empty change set or [`Notification::Error`]. Advances that leave a
//! collection unchanged deliver nothing.

use crate::changeset::ChangeSet;
use crate::collection::{CollectionState, LiveCollection};
use crate::error::Error;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// What a notification callback receives.
#[derive(Debug)]
pub enum Notification<'a> {
    /// The collection's state is established; there is nothing to diff.
    Initial,
    /// The collection changed since the previous callback.
    Changed(&'a ChangeSet),
    /// The collection became invalid. No further callbacks follow.
    Error(&'a Error),
}

impl Notification<'_> {
    /// Returns the change set, if this is a change.
    #[must_use]
    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            Self::Changed(changes) => Some(changes),
            _ => None,
        }
    }

    /// Returns true for [`Notification::Initial`].
    #[must_use]
    pub const fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }
}

type Callback = Box<dyn FnMut(&LiveCollection, Notification<'_>)>;

pub(crate) struct Subscription {
    callback: RefCell<Callback>,
    active: Cell<bool>,
    initial_delivered: Cell<bool>,
}

impl Subscription {
    pub(crate) fn new(callback: Callback) -> Self {
        Self {
            callback: RefCell::new(callback),
            active: Cell::new(true),
            initial_delivered: Cell::new(false),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Marks the initial state as delivered, returning the previous flag.
    pub(crate) fn take_initial(&self) -> bool {
        !self.initial_delivered.replace(true)
    }

    pub(crate) fn call(&self, collection: &LiveCollection, notification: Notification<'_>) {
        if !self.active.get() {
            return;
        }
        if let Ok(mut callback) = self.callback.try_borrow_mut() {
            (callback)(collection, notification);
        }
    }
}

/// Keeps a subscription alive. Disposing or dropping it stops callbacks.
///
/// Disposing is idempotent and may happen inside the subscription's own
/// callback; a callback already running is not interrupted.
pub struct NotificationToken {
    state: RefCell<Option<Rc<CollectionState>>>,
    subscription: Weak<Subscription>,
}

impl NotificationToken {
    pub(crate) fn new(state: &Rc<CollectionState>, subscription: &Rc<Subscription>) -> Self {
        Self {
            state: RefCell::new(Some(Rc::clone(state))),
            subscription: Rc::downgrade(subscription),
        }
    }

    /// Returns true until the token is disposed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription
            .upgrade()
            .is_some_and(|subscription| subscription.is_active())
    }

    /// Stops all future callbacks for this subscription.
    pub fn dispose(&self) {
        let Some(state) = self.state.borrow_mut().take() else {
            return;
        };
        if let Some(subscription) = self.subscription.upgrade() {
            subscription.active.set(false);
            state.unsubscribe(&subscription);
        }
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationToken")
            .field("active", &self.is_active())
            .finish()
    }
}
