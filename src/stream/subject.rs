//! Subject - hot multicast source of a stream.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Listener, Stream, Subscription};

struct Slot<T> {
    id: usize,
    active: Rc<Cell<bool>>,
    listener: Listener<T>,
}

struct SubjectInner<T> {
    slots: Vec<Slot<T>>,
    next_id: usize,
}

/// Hot stream source. `send` delivers to every listener attached at that time.
///
/// Listeners may subscribe or unsubscribe from inside a delivery; a listener
/// removed mid-delivery does not receive the value being delivered.
pub struct Subject<T> {
    inner: Rc<RefCell<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SubjectInner {
                slots: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Push a value to every current listener.
    pub fn send(&self, value: T) {
        // Snapshot so listeners can (un)subscribe while we deliver
        let snapshot: Vec<(Rc<Cell<bool>>, Listener<T>)> = self
            .inner
            .borrow()
            .slots
            .iter()
            .map(|slot| (slot.active.clone(), slot.listener.clone()))
            .collect();

        for (active, listener) in snapshot {
            if active.get() {
                listener(value.clone());
            }
        }
    }

    /// Attach a listener directly.
    pub fn attach(&self, listener: Listener<T>) -> Subscription {
        let active = Rc::new(Cell::new(true));
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.push(Slot {
                id,
                active: active.clone(),
                listener,
            });
            id
        };

        let inner = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            active.set(false);
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().slots.retain(|slot| slot.id != id);
            }
        })
    }

    /// Stream view of this subject.
    pub fn stream(&self) -> Stream<T> {
        let subject = self.clone();
        Stream::new(move |listener| subject.attach(listener))
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }
}
