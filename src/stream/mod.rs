//! Push Streams - the dataflow layer graphs are built from.
//!
//! A [`Stream`] is a recipe for attaching a listener. Nothing runs until
//! someone subscribes, and each subscription gets its own operator state
//! (a `scan` started twice counts twice). [`Subject`] is the hot, multicast
//! entry point: values sent into it reach whoever is listening right now.
//! [`Stream::share`] turns a cold chain into a ref-counted multicast one.
//!
//! Delivery is synchronous: `send` returns after every listener has run, and
//! `start_with` emits during `subscribe`. Anything that must wait for "the
//! next tick" goes through the [`scheduler`].
//!
//! # Example
//!
//! ```
//! use spark_restart::stream::Subject;
//!
//! let clicks = Subject::new();
//! let total = clicks.stream().map(|_: ()| 1).scan(0, |sum, n| sum + n).start_with(0);
//!
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let seen_clone = seen.clone();
//! let sub = total.subscribe(move |n| seen_clone.borrow_mut().push(n));
//!
//! clicks.send(());
//! clicks.send(());
//! sub.unsubscribe();
//! clicks.send(());
//!
//! assert_eq!(*seen.borrow(), vec![0, 1, 2]);
//! ```

mod operators;
pub mod scheduler;
mod subject;
mod subscription;

use std::rc::Rc;

pub use subject::Subject;
pub use subscription::Subscription;

/// Listener attached to a stream. Rc so operators can share it across closures.
pub type Listener<T> = Rc<dyn Fn(T)>;

/// A lazily subscribed, synchronous push stream.
pub struct Stream<T> {
    producer: Rc<dyn Fn(Listener<T>) -> Subscription>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T: 'static> Stream<T> {
    /// Create a stream from its subscribe function.
    ///
    /// `producer` is called once per subscriber and returns the teardown for
    /// that subscriber.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Listener<T>) -> Subscription + 'static,
    {
        Self {
            producer: Rc::new(producer),
        }
    }

    /// A stream that never emits.
    pub fn never() -> Self {
        Self::new(|_| Subscription::empty())
    }

    /// Attach a listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(T) + 'static,
    {
        (self.producer)(Rc::new(listener))
    }

    /// Attach an already shared listener.
    pub fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        (self.producer)(listener)
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// A cold stream that emits `values` synchronously to each subscriber.
    pub fn of(values: Vec<T>) -> Self {
        Self::new(move |listener| {
            for value in &values {
                listener(value.clone());
            }
            Subscription::empty()
        })
    }
}
