//! Run - wire `main` to its drivers.
//!
//! Wiring happens in two phases so a failure never leaves half a graph
//! attached:
//!
//! 1. **wire** - call every driver inside the graph's wiring context, call
//!    `main`, type-check its sinks. Nothing is active yet; on error every
//!    driver releases what it set up for the graph.
//! 2. **commit** - activate the graph on restartable drivers, then subscribe
//!    each sink to its driver's proxy. Sinks that emit on subscribe
//!    (`start_with`) reach the drivers here.
//!
//! `run` does both. `restart` does them separately so it can open the replay
//! window in between.

use std::rc::Rc;

use crate::error::Result;

use super::driver::{AnyDriver, Connector, Drivers};
use super::graph::{self, GraphId};
use super::sources::{Handle, Sinks, Sources};

/// A graph that has been wired but not yet committed.
pub(crate) struct Wiring {
    graph: GraphId,
    sources: Sources,
    sinks: Sinks,
    drivers: Vec<Rc<dyn AnyDriver>>,
    connectors: Vec<Connector>,
}

impl Wiring {
    pub(crate) fn graph(&self) -> GraphId {
        self.graph
    }

    /// Activate and subscribe. Cannot fail: everything fallible ran in `wire`.
    pub(crate) fn commit(self) -> Handle {
        for driver in &self.drivers {
            if let Some(replayable) = driver.replayable() {
                replayable.activate(self.graph);
            }
        }

        for connect in self.connectors {
            self.sinks.hold(connect());
        }

        tracing::debug!(graph = %self.graph, sinks = self.sinks.connected(), "graph committed");

        Handle {
            sources: Some(self.sources),
            sinks: Some(self.sinks),
        }
    }
}

/// Wire `main` against `drivers` without activating anything.
pub(crate) fn wire<M>(main: &M, drivers: &Drivers) -> Result<Wiring>
where
    M: Fn(&Sources) -> Result<Sinks>,
{
    let graph = GraphId::next();
    let mut sources = Sources::new(graph);
    let mut proxies = Vec::with_capacity(drivers.len());
    let mut invoked: Vec<Rc<dyn AnyDriver>> = Vec::with_capacity(drivers.len());

    let wired = graph::within(graph, || -> Result<()> {
        for (name, driver) in drivers.iter() {
            let wired = driver.wire(name)?;
            invoked.push(driver.clone());
            sources.insert(name.clone(), driver.clone(), wired.source);
            proxies.push((name.clone(), driver.clone(), wired.proxy));
        }
        Ok(())
    });

    if let Err(err) = wired {
        tracing::debug!(graph = %graph, error = %err, "driver failed while wiring");
        sources.dispose();
        return Err(err);
    }

    let sinks = match main(&sources) {
        Ok(sinks) => sinks,
        Err(err) => {
            tracing::debug!(graph = %graph, error = %err, "main failed while wiring");
            sources.dispose();
            return Err(err);
        }
    };

    let mut connectors = Vec::with_capacity(proxies.len());
    for (name, driver, proxy) in &proxies {
        match driver.connector(name, &sinks, proxy.as_ref()) {
            Ok(Some(connector)) => connectors.push(connector),
            Ok(None) => {}
            Err(err) => {
                sources.dispose();
                return Err(err);
            }
        }
    }

    for name in sinks.names() {
        if !drivers.contains(name) {
            tracing::warn!(graph = %graph, sink = %name, "sink has no driver, ignoring it");
        }
    }

    Ok(Wiring {
        graph,
        sources,
        sinks,
        drivers: invoked,
        connectors,
    })
}

/// Wire `main` to `drivers` and start it.
///
/// ```
/// use spark_restart::runtime::{driver_fn, run, Drivers, Sinks};
/// use spark_restart::stream::Stream;
///
/// let drivers = Drivers::new().with("log", driver_fn(|sink: Option<Stream<String>>, _: &str| {
///     if let Some(sink) = sink {
///         sink.subscribe(|line| println!("{line}"));
///     }
///     Ok(())
/// }));
///
/// let handle = run(
///     |_sources: &spark_restart::runtime::Sources| Ok(Sinks::new().with("log", Stream::of(vec!["hi".to_string()]))),
///     &drivers,
/// ).unwrap();
/// handle.dispose();
/// ```
pub fn run<M>(main: M, drivers: &Drivers) -> Result<Handle>
where
    M: Fn(&Sources) -> Result<Sinks>,
{
    let wiring = wire(&main, drivers)?;
    Ok(wiring.commit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runtime::driver::{driver_fn, Driver};
    use crate::stream::{Stream, Subject};
    use std::cell::{Cell, RefCell};

    /// Driver that records every sink value and exposes a subject as source.
    fn echo_driver(
        log: Rc<RefCell<Vec<i32>>>,
        input: Subject<i32>,
    ) -> impl Driver<Sink = i32, Source = Stream<i32>> {
        driver_fn(move |sink: Option<Stream<i32>>, _: &str| {
            if let Some(sink) = sink {
                let log = log.clone();
                sink.subscribe(move |v| log.borrow_mut().push(v));
            }
            Ok(input.stream())
        })
    }

    fn doubler(sources: &Sources) -> Result<Sinks> {
        let numbers = sources.get::<Stream<i32>>("echo")?;
        Ok(Sinks::new().with("echo", numbers.map(|v| v * 2).start_with(0)))
    }

    #[test]
    fn test_run_wires_sources_to_sinks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let input = Subject::new();
        let drivers = Drivers::new().with("echo", echo_driver(log.clone(), input.clone()));

        let handle = run(doubler, &drivers).unwrap();
        input.send(2);
        input.send(5);
        assert_eq!(*log.borrow(), vec![0, 4, 10]);

        handle.dispose();
        input.send(7);
        assert_eq!(*log.borrow(), vec![0, 4, 10]);
        assert_eq!(input.listener_count(), 0);
    }

    #[test]
    fn test_driver_failure_aborts_before_main() {
        let main_calls = Rc::new(Cell::new(0));
        let main_calls_clone = main_calls.clone();
        let drivers = Drivers::new().with(
            "broken",
            driver_fn(|_: Option<Stream<()>>, name: &str| -> Result<()> {
                Err(Error::driver(name, "offline"))
            }),
        );

        let result = run(
            move |_: &Sources| {
                main_calls_clone.set(main_calls_clone.get() + 1);
                Ok(Sinks::new())
            },
            &drivers,
        );

        assert_eq!(result.unwrap_err(), Error::driver("broken", "offline"));
        assert_eq!(main_calls.get(), 0);
    }

    #[test]
    fn test_main_failure_is_returned() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let drivers = Drivers::new().with("echo", echo_driver(log.clone(), Subject::new()));

        let result = run(|_: &Sources| Err(Error::main("bad config")), &drivers);
        assert_eq!(result.unwrap_err(), Error::main("bad config"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_sink_type_checked_before_subscribing() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let drivers = Drivers::new().with("echo", echo_driver(log.clone(), Subject::new()));

        let result = run(
            |_: &Sources| Ok(Sinks::new().with("echo", Stream::of(vec!["nope".to_string()]))),
            &drivers,
        );
        assert!(matches!(result, Err(Error::SinkType { .. })));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_unknown_sink_is_ignored() {
        let drivers = Drivers::new();
        let handle = run(
            |_: &Sources| Ok(Sinks::new().with("nowhere", Stream::of(vec![1]))),
            &drivers,
        )
        .unwrap();
        assert_eq!(handle.sinks.as_ref().map(Sinks::connected), Some(0));
    }

    #[test]
    fn test_missing_source() {
        let drivers = Drivers::new();
        let result = run(
            |sources: &Sources| {
                sources.get::<Stream<i32>>("echo")?;
                Ok(Sinks::new())
            },
            &drivers,
        );
        assert_eq!(result.unwrap_err(), Error::MissingSource("echo".into()));
    }
}
