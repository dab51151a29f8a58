//! Sources, sinks and the live handle of a running graph.

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::stream::{Stream, Subscription};

use super::driver::AnyDriver;
use super::graph::GraphId;

// =============================================================================
// Sources
// =============================================================================

struct SourceEntry {
    driver: Rc<dyn AnyDriver>,
    value: Box<dyn Any>,
}

/// What the drivers handed to `main`, keyed by driver name.
pub struct Sources {
    graph: GraphId,
    entries: BTreeMap<String, SourceEntry>,
    disposed: Cell<bool>,
}

impl Sources {
    pub(crate) fn new(graph: GraphId) -> Self {
        Self {
            graph,
            entries: BTreeMap::new(),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn insert(&mut self, name: String, driver: Rc<dyn AnyDriver>, value: Box<dyn Any>) {
        self.entries.insert(name, SourceEntry { driver, value });
    }

    /// The graph these sources belong to.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Typed copy of the source named `name`.
    pub fn get<S: Clone + 'static>(&self, name: &str) -> Result<S> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::MissingSource(name.to_string()))?;
        entry
            .value
            .downcast_ref::<S>()
            .cloned()
            .ok_or_else(|| Error::SourceType {
                name: name.to_string(),
                expected: type_name::<S>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Let every driver release what it set up for this graph.
    ///
    /// Restartable drivers detach this graph's lane and stop recording for it;
    /// the resource behind them stays up. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for (name, entry) in &self.entries {
            tracing::trace!(graph = %self.graph, driver = %name, "disposing source");
            entry.driver.dispose_source(entry.value.as_ref());
            if let Some(replayable) = entry.driver.replayable() {
                replayable.release(self.graph);
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl fmt::Debug for Sources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sources")
            .field("graph", &self.graph)
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Streams `main` hands to the drivers, keyed by driver name.
///
/// ```
/// use spark_restart::runtime::Sinks;
/// use spark_restart::stream::Stream;
///
/// let sinks = Sinks::new().with("log", Stream::of(vec!["hello".to_string()]));
/// assert!(sinks.get::<String>("log").unwrap().is_some());
/// assert!(sinks.get::<String>("http").unwrap().is_none());
/// ```
#[derive(Default)]
pub struct Sinks {
    streams: BTreeMap<String, Box<dyn Any>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder style).
    pub fn with<T: 'static>(mut self, name: impl Into<String>, stream: Stream<T>) -> Self {
        self.insert(name, stream);
        self
    }

    /// Add or replace a sink.
    pub fn insert<T: 'static>(&mut self, name: impl Into<String>, stream: Stream<T>) {
        self.streams.insert(name.into(), Box::new(stream));
    }

    /// Typed copy of the sink named `name`, `None` if there is none.
    pub fn get<T: 'static>(&self, name: &str) -> Result<Option<Stream<T>>> {
        match self.streams.get(name) {
            None => Ok(None),
            Some(stream) => stream
                .downcast_ref::<Stream<T>>()
                .cloned()
                .map(Some)
                .ok_or_else(|| Error::SinkType {
                    name: name.to_string(),
                    expected: type_name::<T>(),
                }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub(crate) fn hold(&self, subscription: Subscription) {
        self.subscriptions.borrow_mut().push(subscription);
    }

    /// Number of sink streams currently plugged into drivers.
    pub fn connected(&self) -> usize {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|subscription| !subscription.is_closed())
            .count()
    }

    /// Unplug every sink from its driver, tearing down main's stream chains.
    /// Idempotent.
    pub fn dispose(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl fmt::Debug for Sinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sinks")
            .field("names", &self.streams.keys().collect::<Vec<_>>())
            .field("connected", &self.connected())
            .finish()
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Live handle of a running graph.
///
/// `run` fills both fields. Either may be `None` when handing a handle to
/// `restart`; a missing field just means there is nothing to dispose there.
#[derive(Debug, Default)]
pub struct Handle {
    pub sources: Option<Sources>,
    pub sinks: Option<Sinks>,
}

impl Handle {
    /// Handle holding only sources.
    pub fn from_sources(sources: Sources) -> Self {
        Self {
            sources: Some(sources),
            sinks: None,
        }
    }

    /// Graph this handle points at, if it has sources.
    pub fn graph(&self) -> Option<GraphId> {
        self.sources.as_ref().map(Sources::graph)
    }

    /// Typed source lookup, shorthand for `sources.get`.
    pub fn source<S: Clone + 'static>(&self, name: &str) -> Result<S> {
        match &self.sources {
            Some(sources) => sources.get(name),
            None => Err(Error::MissingSource(name.to_string())),
        }
    }

    /// Dispose sources and sinks. Safe to call repeatedly.
    pub fn dispose(&self) {
        if let Some(sources) = &self.sources {
            sources.dispose();
        }
        if let Some(sinks) = &self.sinks {
            sinks.dispose();
        }
    }
}
