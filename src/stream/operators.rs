//! Stream operators.
//!
//! All operators are cold: the upstream is subscribed once per downstream
//! subscriber, and per-subscriber state (e.g. the `scan` accumulator) lives
//! in that subscription. `share()` is the one exception.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Listener, Stream, Subject, Subscription};

impl<T: 'static> Stream<T> {
    /// Transform each value.
    pub fn map<U, F>(&self, f: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> U + 'static,
    {
        let upstream = self.clone();
        let f = Rc::new(f);
        Stream::new(move |listener: Listener<U>| {
            let f = f.clone();
            upstream.subscribe(move |value| listener(f(value)))
        })
    }

    /// Replace each value with a constant.
    pub fn map_to<U>(&self, value: U) -> Stream<U>
    where
        U: Clone + 'static,
    {
        self.map(move |_| value.clone())
    }

    /// Keep values matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Stream<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let upstream = self.clone();
        let predicate = Rc::new(predicate);
        Stream::new(move |listener: Listener<T>| {
            let predicate = predicate.clone();
            upstream.subscribe(move |value| {
                if predicate(&value) {
                    listener(value);
                }
            })
        })
    }

    /// Run a side effect for each value, passing it through unchanged.
    pub fn inspect<F>(&self, f: F) -> Stream<T>
    where
        F: Fn(&T) + 'static,
    {
        let upstream = self.clone();
        let f = Rc::new(f);
        Stream::new(move |listener: Listener<T>| {
            let f = f.clone();
            upstream.subscribe(move |value| {
                f(&value);
                listener(value);
            })
        })
    }

    /// Running accumulation. Emits the new accumulator after every value.
    pub fn scan<A, F>(&self, seed: A, f: F) -> Stream<A>
    where
        A: Clone + 'static,
        F: Fn(A, T) -> A + 'static,
    {
        let upstream = self.clone();
        let f = Rc::new(f);
        Stream::new(move |listener: Listener<A>| {
            let f = f.clone();
            let acc = Rc::new(RefCell::new(seed.clone()));
            upstream.subscribe(move |value| {
                let current = acc.borrow().clone();
                let next = f(current, value);
                *acc.borrow_mut() = next.clone();
                listener(next);
            })
        })
    }

    /// Interleave values from both streams in arrival order.
    pub fn merge(&self, other: &Stream<T>) -> Stream<T> {
        Stream::merge_all(vec![self.clone(), other.clone()])
    }

    /// Interleave values from every stream in arrival order.
    pub fn merge_all(streams: Vec<Stream<T>>) -> Stream<T> {
        Stream::new(move |listener: Listener<T>| {
            let subscriptions = streams
                .iter()
                .map(|stream| stream.subscribe_listener(listener.clone()))
                .collect();
            Subscription::all(subscriptions)
        })
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Emit `value` synchronously on subscribe, then the upstream values.
    pub fn start_with(&self, value: T) -> Stream<T> {
        let upstream = self.clone();
        Stream::new(move |listener: Listener<T>| {
            listener(value.clone());
            upstream.subscribe_listener(listener)
        })
    }

    /// Multicast with reference counting.
    ///
    /// The first subscriber connects the upstream; the last one to leave
    /// disconnects it. Subscribers in between share one upstream subscription.
    pub fn share(&self) -> Stream<T> {
        struct Shared<T> {
            subject: Subject<T>,
            refs: usize,
            connection: Option<Subscription>,
        }

        let upstream = self.clone();
        let shared = Rc::new(RefCell::new(Shared {
            subject: Subject::new(),
            refs: 0,
            connection: None,
        }));

        Stream::new(move |listener: Listener<T>| {
            let (subject, connect) = {
                let mut state = shared.borrow_mut();
                state.refs += 1;
                (state.subject.clone(), state.refs == 1)
            };

            let attached = subject.attach(listener);
            if connect {
                // No borrow held here: the upstream may emit synchronously
                let sink = subject.clone();
                let connection = upstream.subscribe(move |value| sink.send(value));
                shared.borrow_mut().connection = Some(connection);
            }

            let shared = shared.clone();
            Subscription::new(move || {
                attached.unsubscribe();
                let connection = {
                    let mut state = shared.borrow_mut();
                    state.refs = state.refs.saturating_sub(1);
                    if state.refs == 0 { state.connection.take() } else { None }
                };
                if let Some(connection) = connection {
                    connection.unsubscribe();
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn collect<T: Clone + 'static>(stream: &Stream<T>) -> (Rc<RefCell<Vec<T>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = stream.subscribe(move |v| seen_clone.borrow_mut().push(v));
        (seen, sub)
    }

    #[test]
    fn test_map_filter() {
        let subject = Subject::new();
        let evens = subject.stream().filter(|v: &i32| v % 2 == 0).map(|v| v * 10);
        let (seen, _sub) = collect(&evens);

        for v in 1..=4 {
            subject.send(v);
        }
        assert_eq!(*seen.borrow(), vec![20, 40]);
    }

    #[test]
    fn test_scan_state_is_per_subscription() {
        let subject = Subject::new();
        let total = subject.stream().scan(0, |acc, v: i32| acc + v);

        let (first, _a) = collect(&total);
        subject.send(5);
        let (second, _b) = collect(&total);
        subject.send(1);

        assert_eq!(*first.borrow(), vec![5, 6]);
        assert_eq!(*second.borrow(), vec![1]);
    }

    #[test]
    fn test_start_with_is_synchronous() {
        let subject: Subject<i32> = Subject::new();
        let (seen, _sub) = collect(&subject.stream().start_with(0));
        assert_eq!(*seen.borrow(), vec![0]);

        subject.send(7);
        assert_eq!(*seen.borrow(), vec![0, 7]);
    }

    #[test]
    fn test_merge_order_and_teardown() {
        let add = Subject::new();
        let sub_ = Subject::new();
        let merged = add.stream().map_to(1).merge(&sub_.stream().map_to(-1));
        let (seen, sub) = collect(&merged);

        add.send(());
        sub_.send(());
        add.send(());
        assert_eq!(*seen.borrow(), vec![1, -1, 1]);

        sub.unsubscribe();
        assert_eq!(add.listener_count(), 0);
        assert_eq!(sub_.listener_count(), 0);
    }

    #[test]
    fn test_share_connects_once() {
        let subject = Subject::new();
        let effects = Rc::new(Cell::new(0));
        let effects_clone = effects.clone();
        let shared = subject
            .stream()
            .inspect(move |_: &i32| effects_clone.set(effects_clone.get() + 1))
            .share();

        let (a, sub_a) = collect(&shared);
        let (b, sub_b) = collect(&shared);
        assert_eq!(subject.listener_count(), 1);

        subject.send(1);
        assert_eq!(effects.get(), 1);
        assert_eq!(*a.borrow(), vec![1]);
        assert_eq!(*b.borrow(), vec![1]);

        sub_a.unsubscribe();
        assert_eq!(subject.listener_count(), 1);
        sub_b.unsubscribe();
        assert_eq!(subject.listener_count(), 0);

        // Reconnects for a new subscriber
        let (c, _sub_c) = collect(&shared);
        subject.send(2);
        assert_eq!(*c.borrow(), vec![2]);
    }

    #[test]
    fn test_of_and_never() {
        let (seen, _sub) = collect(&Stream::of(vec![1, 2, 3]));
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);

        let (seen, sub) = collect(&Stream::<i32>::never());
        assert!(seen.borrow().is_empty());
        sub.unsubscribe();
    }
}
