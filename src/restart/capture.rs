//! Event capture - recording what sources emit so it can be replayed.
//!
//! A restartable driver hands every graph a *captured* view of its real
//! source. The view looks and behaves like the real source, but each event
//! stream in it goes through a [`Recorder`]:
//!
//! - live events are appended to the driver's [`EventLog`] (while the graph is
//!   open) and passed on,
//! - replayed events are injected under the same key and passed on, without
//!   being logged a second time.
//!
//! How a source is made of streams is driver business, so drivers opt in by
//! implementing [`Capture`] for their source type.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::stream::{Stream, Subject};

// =============================================================================
// Sequence
// =============================================================================

/// Position of an event in the global emission order.
///
/// Shared by every log on the thread, so events recorded by different drivers
/// interleave correctly on replay.
pub type Sequence = u64;

thread_local! {
    static NEXT_SEQUENCE: Cell<Sequence> = const { Cell::new(1) };
}

/// Allocate the next sequence number.
pub fn next_sequence() -> Sequence {
    NEXT_SEQUENCE.with(|next| {
        let seq = next.get();
        next.set(seq + 1);
        seq
    })
}

/// Last sequence number handed out (0 before the first event).
pub fn latest_sequence() -> Sequence {
    NEXT_SEQUENCE.with(|next| next.get() - 1)
}

// =============================================================================
// Event Log
// =============================================================================

/// One recorded source event.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry<E> {
    pub seq: Sequence,
    /// Which stream of the source emitted it (e.g. `".add click"`).
    pub key: String,
    pub event: E,
}

/// Append-only history of source events. Clones share the same history.
pub struct EventLog<E> {
    entries: Rc<RefCell<Vec<LogEntry<E>>>>,
}

impl<E> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventLog<E> {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Append an event, stamping it with the next sequence number.
    pub fn push(&self, key: impl Into<String>, event: E) -> Sequence {
        let seq = next_sequence();
        self.entries.borrow_mut().push(LogEntry {
            seq,
            key: key.into(),
            event,
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl<E: Clone> EventLog<E> {
    /// Copy of every entry, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry<E>> {
        self.entries.borrow().clone()
    }

    /// Copy of the entries with `seq <= until` (all of them for `None`).
    pub fn until(&self, until: Option<Sequence>) -> Vec<LogEntry<E>> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| until.is_none_or(|limit| entry.seq <= limit))
            .cloned()
            .collect()
    }
}

impl<E> fmt::Debug for EventLog<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

// =============================================================================
// Recorder
// =============================================================================

struct RecorderInner<E> {
    log: EventLog<E>,
    open: Rc<Cell<bool>>,
    streams: RefCell<HashMap<String, Stream<E>>>,
    replay: RefCell<HashMap<String, Subject<E>>>,
}

/// Per-graph recording context for one driver's source.
pub struct Recorder<E> {
    inner: Rc<RecorderInner<E>>,
}

impl<E> Clone for Recorder<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Clone + 'static> Recorder<E> {
    pub fn new(log: EventLog<E>) -> Self {
        Self {
            inner: Rc::new(RecorderInner {
                log,
                open: Rc::new(Cell::new(true)),
                streams: RefCell::new(HashMap::new()),
                replay: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Captured version of `live`, identified by `key`.
    ///
    /// Asking twice for the same key returns the same shared stream, so an
    /// event is logged once however many times `main` listens to it.
    pub fn record(&self, key: impl Into<String>, live: Stream<E>) -> Stream<E> {
        let key = key.into();
        if let Some(stream) = self.inner.streams.borrow().get(&key) {
            return stream.clone();
        }

        let replayed = self
            .inner
            .replay
            .borrow_mut()
            .entry(key.clone())
            .or_insert_with(Subject::new)
            .clone();

        let open = self.inner.open.clone();
        let log = self.inner.log.clone();
        let log_key = key.clone();
        let captured = live
            .filter(move |_| open.get())
            .inspect(move |event| {
                let seq = log.push(log_key.clone(), event.clone());
                tracing::trace!(key = %log_key, seq, "recorded source event");
            })
            .merge(&replayed.stream())
            .share();

        self.inner.streams.borrow_mut().insert(key, captured.clone());
        captured
    }

    /// Inject a recorded event under `key`. Returns false if nothing in this
    /// graph asked for that key (or the recorder is closed).
    pub fn replay(&self, key: &str, event: E) -> bool {
        let subject = self.inner.replay.borrow().get(key).cloned();
        match subject {
            Some(subject) => {
                subject.send(event);
                true
            }
            None => false,
        }
    }

    /// Stop logging and stop accepting replays. Idempotent.
    pub fn close(&self) {
        self.inner.open.set(false);
        self.inner.replay.borrow_mut().clear();
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.get()
    }

    /// Keys captured so far in this graph.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.streams.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The history this recorder appends to.
    pub fn log(&self) -> &EventLog<E> {
        &self.inner.log
    }

    pub(crate) fn same(&self, other: &Recorder<E>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// Capture
// =============================================================================

/// Source types that can be wrapped for recording and replay.
///
/// `capture` returns a copy of the source whose event streams go through
/// `recorder` (see [`Recorder::record`]). Everything else about the source
/// (its methods, nested selections) must keep working unchanged.
pub trait Capture: Clone + 'static {
    type Event: Clone + 'static;

    fn capture(&self, recorder: &Recorder<Self::Event>) -> Self;
}

/// A plain stream source is a single stream under the empty key.
impl<E: Clone + 'static> Capture for Stream<E> {
    type Event = E;

    fn capture(&self, recorder: &Recorder<E>) -> Self {
        recorder.record("", self.clone())
    }
}

/// Sink-only drivers have nothing to record.
impl Capture for () {
    type Event = ();

    fn capture(&self, _recorder: &Recorder<()>) -> Self {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<T: Clone + 'static>(stream: &Stream<T>) -> Rc<RefCell<Vec<T>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        // Left subscribed for the duration of the test
        let _sub = stream.subscribe(move |v| seen_clone.borrow_mut().push(v));
        seen
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let a = next_sequence();
        let b = next_sequence();
        assert!(b > a);
        assert_eq!(latest_sequence(), b);
    }

    #[test]
    fn test_live_events_are_logged_once() {
        let log = EventLog::new();
        let recorder = Recorder::new(log.clone());
        let live = Subject::new();

        let first = recorder.record("tick", live.stream());
        let second = recorder.record("tick", live.stream());
        let a = collect(&first);
        let b = collect(&second);

        live.send(1);
        live.send(2);

        assert_eq!(*a.borrow(), vec![1, 2]);
        assert_eq!(*b.borrow(), vec![1, 2]);
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.snapshot().iter().map(|e| e.event).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(live.listener_count(), 1);
    }

    #[test]
    fn test_replayed_events_are_not_logged() {
        let log = EventLog::new();
        let recorder = Recorder::new(log.clone());
        let live: Subject<&str> = Subject::new();
        let seen = collect(&recorder.record("key", live.stream()));

        assert!(recorder.replay("key", "old"));
        assert!(!recorder.replay("other", "ignored"));
        live.send("new");

        assert_eq!(*seen.borrow(), vec!["old", "new"]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].key, "key");
    }

    #[test]
    fn test_closed_recorder_goes_quiet() {
        let log = EventLog::new();
        let recorder = Recorder::new(log.clone());
        let live = Subject::new();
        let seen = collect(&recorder.record("key", live.stream()));

        recorder.close();
        recorder.close();
        live.send(1);

        assert!(!recorder.is_open());
        assert!(!recorder.replay("key", 2));
        assert!(seen.borrow().is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_until_cuts_history() {
        let log = EventLog::new();
        let first = log.push("a", 'x');
        log.push("a", 'y');

        assert_eq!(log.until(Some(first)).len(), 1);
        assert_eq!(log.until(None).len(), 2);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_stream_capture_uses_empty_key() {
        let log = EventLog::new();
        let recorder = Recorder::new(log.clone());
        let live = Subject::new();
        let captured = live.stream().capture(&recorder);
        let _seen = collect(&captured);

        live.send(9);
        assert_eq!(recorder.keys(), vec![String::new()]);
        assert_eq!(log.snapshot()[0].key, "");
    }
}
