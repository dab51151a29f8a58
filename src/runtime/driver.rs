//! Drivers - the boundary between a graph and the outside world.
//!
//! A driver consumes one sink stream (commands from `main`) and produces one
//! source (whatever `main` reads from it). [`Drivers`] is the named set a graph
//! is wired against; it type-erases each driver so differently typed drivers
//! can live in one map.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::restart::Replayable;
use crate::stream::{Stream, Subject, Subscription};

use super::sources::Sinks;

// =============================================================================
// Driver Trait
// =============================================================================

/// One external-effect boundary.
pub trait Driver: 'static {
    /// Values `main` sends to the driver.
    type Sink: Clone + 'static;
    /// What the driver hands back to `main`.
    type Source: Clone + 'static;

    /// Start the driver.
    ///
    /// `sink` is `None` when there is nothing to consume yet; the returned
    /// source must still be usable.
    fn call(&self, sink: Option<Stream<Self::Sink>>, name: &str) -> Result<Self::Source>;

    /// Release what `call` set up for this source.
    fn dispose(&self, _source: &Self::Source) {}

    /// Restart hooks, for drivers wrapped with `restartable`.
    fn as_replayable(&self) -> Option<&dyn Replayable> {
        None
    }
}

// =============================================================================
// Closure Drivers
// =============================================================================

/// Driver built from a closure. See [`driver_fn`].
pub struct FnDriver<Si, So, F> {
    f: F,
    _types: PhantomData<fn(Si) -> So>,
}

/// Wrap a closure as a driver.
///
/// ```
/// use spark_restart::runtime::{driver_fn, Driver};
/// use spark_restart::stream::Stream;
///
/// let ticks = driver_fn(|_sink: Option<Stream<()>>, _name: &str| Ok(Stream::of(vec![1, 2, 3])));
/// assert!(ticks.call(None, "ticks").is_ok());
/// ```
pub fn driver_fn<Si, So, F>(f: F) -> FnDriver<Si, So, F>
where
    F: Fn(Option<Stream<Si>>, &str) -> Result<So>,
{
    FnDriver {
        f,
        _types: PhantomData,
    }
}

impl<Si, So, F> Driver for FnDriver<Si, So, F>
where
    Si: Clone + 'static,
    So: Clone + 'static,
    F: Fn(Option<Stream<Si>>, &str) -> Result<So> + 'static,
{
    type Sink = Si;
    type Source = So;

    fn call(&self, sink: Option<Stream<Si>>, name: &str) -> Result<So> {
        (self.f)(sink, name)
    }
}

// =============================================================================
// Type Erasure
// =============================================================================

/// A driver invoked for one graph: its source and the sink proxy it consumes.
pub(crate) struct Wired {
    pub source: Box<dyn Any>,
    pub proxy: Box<dyn Any>,
}

/// Deferred subscription of a sink stream into its driver's proxy.
pub(crate) type Connector = Box<dyn FnOnce() -> Subscription>;

pub(crate) trait AnyDriver {
    fn wire(&self, name: &str) -> Result<Wired>;
    fn connector(&self, name: &str, sinks: &Sinks, proxy: &dyn Any) -> Result<Option<Connector>>;
    fn dispose_source(&self, source: &dyn Any);
    fn replayable(&self) -> Option<&dyn Replayable>;
}

impl<D: Driver> AnyDriver for D {
    fn wire(&self, name: &str) -> Result<Wired> {
        // The proxy exists before main does; main's sink is plugged in later
        let proxy = Subject::<D::Sink>::new();
        let source = self.call(Some(proxy.stream()), name)?;
        Ok(Wired {
            source: Box::new(source),
            proxy: Box::new(proxy),
        })
    }

    fn connector(&self, name: &str, sinks: &Sinks, proxy: &dyn Any) -> Result<Option<Connector>> {
        let Some(stream) = sinks.get::<D::Sink>(name)? else {
            return Ok(None);
        };
        let proxy = proxy
            .downcast_ref::<Subject<D::Sink>>()
            .ok_or_else(|| Error::SinkType {
                name: name.to_string(),
                expected: type_name::<D::Sink>(),
            })?
            .clone();

        Ok(Some(Box::new(move || {
            stream.subscribe(move |value| proxy.send(value))
        })))
    }

    fn dispose_source(&self, source: &dyn Any) {
        if let Some(source) = source.downcast_ref::<D::Source>() {
            self.dispose(source);
        }
    }

    fn replayable(&self) -> Option<&dyn Replayable> {
        Driver::as_replayable(self)
    }
}

// =============================================================================
// Driver Set
// =============================================================================

/// Named drivers a graph is wired against.
///
/// Cloning is cheap and shares the drivers, which is what restarting needs:
/// the new graph must see the very same driver values.
#[derive(Clone, Default)]
pub struct Drivers {
    entries: BTreeMap<String, Rc<dyn AnyDriver>>,
}

impl Drivers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a driver (builder style).
    pub fn with<D: Driver>(mut self, name: impl Into<String>, driver: D) -> Self {
        self.insert(name, driver);
        self
    }

    /// Add or replace a driver.
    pub fn insert<D: Driver>(&mut self, name: impl Into<String>, driver: D) {
        self.entries.insert(name.into(), Rc::new(driver));
    }

    /// Driver names, in wiring order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Rc<dyn AnyDriver>)> {
        self.entries.iter()
    }

    /// Drivers that carry restart hooks.
    pub(crate) fn replayable(&self) -> Vec<(String, Rc<dyn AnyDriver>)> {
        self.entries
            .iter()
            .filter(|(_, driver)| driver.replayable().is_some())
            .map(|(name, driver)| (name.clone(), driver.clone()))
            .collect()
    }
}

impl fmt::Debug for Drivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
