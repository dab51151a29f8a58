//! Subscription - the cleanup side of a stream listener.

use std::cell::Cell;
use std::rc::Rc;

/// Handle to an attached listener.
///
/// Unsubscribing runs the teardown once; further calls are no-ops. Clones share
/// the same teardown, so any clone can close it. Dropping a subscription does
/// NOT unsubscribe (same as the cleanup closures returned by handlers).
#[derive(Clone)]
pub struct Subscription {
    teardown: Rc<Cell<Option<Box<dyn FnOnce()>>>>,
}

impl Subscription {
    /// Create a subscription that runs `teardown` on the first `unsubscribe()`.
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: Rc::new(Cell::new(Some(Box::new(teardown)))),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            teardown: Rc::new(Cell::new(None)),
        }
    }

    /// Combine several subscriptions into one.
    pub fn all(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || {
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        })
    }

    /// Detach the listener. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    /// True once the teardown has run (or there never was one).
    pub fn is_closed(&self) -> bool {
        // Cell<Option<Box<..>>> can't be peeked, so take and put back.
        let teardown = self.teardown.take();
        let closed = teardown.is_none();
        self.teardown.set(teardown);
        closed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_runs_once() {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let sub = Subscription::new(move || count_clone.set(count_clone.get() + 1));

        assert!(!sub.is_closed());
        sub.unsubscribe();
        sub.unsubscribe();
        sub.clone().unsubscribe();

        assert_eq!(count.get(), 1);
        assert!(sub.is_closed());
    }

    #[test]
    fn test_all() {
        let count = Rc::new(Cell::new(0));
        let subs = (0..3)
            .map(|_| {
                let count = count.clone();
                Subscription::new(move || count.set(count.get() + 1))
            })
            .collect();

        let combined = Subscription::all(subs);
        combined.unsubscribe();
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_empty_is_closed() {
        let sub = Subscription::empty();
        assert!(sub.is_closed());
        sub.unsubscribe();
    }
}
