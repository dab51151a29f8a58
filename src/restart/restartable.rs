//! Restartable drivers.
//!
//! [`restartable`] wraps a driver so graphs can be swapped underneath it:
//!
//! ```text
//!  graph g1 sink ──► lane 1 ─┐ (inactive, ignored)
//!  graph g2 sink ──► lane 2 ─┴─► [held while replaying] ──► outlet ──► real driver
//!
//!  real source ──capture(recorder g2)──► source handed to g2's main
//! ```
//!
//! - The real driver is called once, with the outlet as its sink. Every later
//!   call reuses that invocation (the "core"), so the external resource is
//!   created once however often the app restarts.
//! - Each graph gets a lane. Only the active lane reaches the outlet; the
//!   runtime activates a lane when it commits the graph.
//! - Each graph gets its own recorder over the real source. Live events go to
//!   the wrapper's history, which outlives graphs and is what restarts replay.
//! - With `pause_sinks_while_replaying`, sink values produced during a restart
//!   are held in a [`ReplayBuffer`] and released in order once replay is done.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::runtime::{current_graph, Driver, GraphId};
use crate::stream::{Stream, Subject, Subscription};

use super::capture::{Capture, EventLog, LogEntry, Recorder, Sequence};
use super::replay::{ReplayBuffer, ReplayStep, Replayable};

// =============================================================================
// Config
// =============================================================================

/// How a restartable driver behaves during a restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartConfig {
    /// Hold sink values produced while replaying and apply them in one go
    /// afterwards (`true`), or apply them as they come (`false`).
    pub pause_sinks_while_replaying: bool,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            pause_sinks_while_replaying: true,
        }
    }
}

impl RestartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause_sinks_while_replaying(mut self, pause: bool) -> Self {
        self.pause_sinks_while_replaying = pause;
        self
    }
}

// =============================================================================
// Core - the one real invocation
// =============================================================================

type LaneId = u64;

/// Event type recorded for driver `D`.
pub type EventOf<D> = <<D as Driver>::Source as Capture>::Event;

struct Core<D: Driver> {
    // Pins the driver's address, which keys the registry
    _driver: Rc<D>,
    source: D::Source,
    outlet: Subject<D::Sink>,
    active: Cell<Option<LaneId>>,
}

thread_local! {
    /// Live cores by driver address, so wrapping one driver twice mounts once.
    static CORES: RefCell<HashMap<usize, Weak<dyn Any>>> = RefCell::new(HashMap::new());

    static NEXT_LANE: Cell<LaneId> = const { Cell::new(0) };
}

fn next_lane() -> LaneId {
    NEXT_LANE.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

fn driver_key<D>(driver: &Rc<D>) -> usize {
    Rc::as_ptr(driver) as *const () as usize
}

/// Core for `driver`, invoking the real driver only if no wrapper has yet.
fn shared_core<D: Driver>(driver: &Rc<D>, name: &str) -> Result<Rc<Core<D>>> {
    let key = driver_key(driver);
    let existing = CORES.with(|cores| cores.borrow().get(&key).and_then(Weak::upgrade));
    if let Some(core) = existing.and_then(|any| any.downcast::<Core<D>>().ok()) {
        tracing::debug!(driver = %name, "reusing running driver");
        return Ok(core);
    }

    let outlet = Subject::new();
    let source = driver.call(Some(outlet.stream()), name)?;
    let core = Rc::new(Core {
        _driver: driver.clone(),
        source,
        outlet,
        active: Cell::new(None),
    });

    let any: Rc<dyn Any> = core.clone();
    CORES.with(|cores| {
        let mut cores = cores.borrow_mut();
        cores.retain(|_, entry| entry.strong_count() > 0);
        cores.insert(key, Rc::downgrade(&any));
    });
    tracing::debug!(driver = %name, "driver started");
    Ok(core)
}

// =============================================================================
// Wrapper state
// =============================================================================

struct Lane<E> {
    id: LaneId,
    graph: GraphId,
    recorder: Recorder<E>,
    subscription: Subscription,
}

struct Wrapper<D: Driver>
where
    D::Source: Capture,
{
    driver: Rc<D>,
    config: RestartConfig,
    core: RefCell<Option<Rc<Core<D>>>>,
    history: EventLog<EventOf<D>>,
    lanes: RefCell<Vec<Lane<EventOf<D>>>>,
    current: RefCell<Option<Recorder<EventOf<D>>>>,
    held: RefCell<ReplayBuffer<D::Sink>>,
    epoch: Cell<u64>,
}

impl<D: Driver> Wrapper<D>
where
    D::Source: Capture,
{
    fn core(&self, name: &str) -> Result<Rc<Core<D>>> {
        if let Some(core) = self.core.borrow().as_ref() {
            return Ok(core.clone());
        }
        let core = shared_core(&self.driver, name)?;
        *self.core.borrow_mut() = Some(core.clone());
        Ok(core)
    }

    fn forward(&self, core: &Core<D>, value: D::Sink) {
        {
            let mut held = self.held.borrow_mut();
            if held.is_recording() {
                held.record(value);
                return;
            }
        }
        core.outlet.send(value);
    }
}

// =============================================================================
// Restartable
// =============================================================================

/// Drop-in driver that survives restarts. Built by [`restartable`].
pub struct Restartable<D: Driver>
where
    D::Source: Capture,
{
    wrapper: Rc<Wrapper<D>>,
}

impl<D: Driver> Clone for Restartable<D>
where
    D::Source: Capture,
{
    fn clone(&self) -> Self {
        Self {
            wrapper: self.wrapper.clone(),
        }
    }
}

/// Wrap `driver` so graphs using it can be restarted.
///
/// Nothing runs until the wrapper is first called. Wrapping the same `Rc`
/// twice gives two independent wrappers over one real invocation.
///
/// ```
/// use std::rc::Rc;
/// use spark_restart::restart::{restartable, RestartConfig};
/// use spark_restart::runtime::driver_fn;
/// use spark_restart::stream::Stream;
///
/// let ticks = driver_fn(|_: Option<Stream<()>>, _: &str| Ok(Stream::<u32>::never()));
/// let ticks = restartable(Rc::new(ticks), RestartConfig::new().pause_sinks_while_replaying(false));
/// assert!(!ticks.is_started());
/// ```
pub fn restartable<D>(driver: Rc<D>, config: RestartConfig) -> Restartable<D>
where
    D: Driver,
    D::Source: Capture,
{
    Restartable {
        wrapper: Rc::new(Wrapper {
            driver,
            config,
            core: RefCell::new(None),
            history: EventLog::new(),
            lanes: RefCell::new(Vec::new()),
            current: RefCell::new(None),
            held: RefCell::new(ReplayBuffer::new()),
            epoch: Cell::new(0),
        }),
    }
}

impl<D: Driver> Restartable<D>
where
    D::Source: Capture,
{
    pub fn config(&self) -> RestartConfig {
        self.wrapper.config
    }

    /// True once the real driver has been invoked.
    pub fn is_started(&self) -> bool {
        self.wrapper.core.borrow().is_some()
    }

    /// Recorded source events, oldest first.
    pub fn history(&self) -> Vec<LogEntry<EventOf<D>>> {
        self.wrapper.history.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.wrapper.history.len()
    }

    /// Forget recorded events. The next restart starts from a blank slate.
    pub fn clear_history(&self) {
        self.wrapper.history.clear();
    }

    /// Sequence of the newest recorded event.
    pub fn latest_sequence(&self) -> Option<Sequence> {
        self.wrapper.history.snapshot().last().map(|entry| entry.seq)
    }

    /// Graph whose sinks currently reach the real driver.
    pub fn active_graph(&self) -> Option<GraphId> {
        let active = self.wrapper.core.borrow().as_ref().and_then(|core| core.active.get())?;
        self.wrapper
            .lanes
            .borrow()
            .iter()
            .find(|lane| lane.id == active)
            .map(|lane| lane.graph)
    }

    /// Number of graphs attached (active or not).
    pub fn lane_count(&self) -> usize {
        self.wrapper.lanes.borrow().len()
    }

    /// True while sink values are being held for a replay.
    pub fn is_holding(&self) -> bool {
        self.wrapper.held.borrow().is_recording()
    }

    /// Sink values currently held.
    pub fn held_len(&self) -> usize {
        self.wrapper.held.borrow().len()
    }
}

impl<D: Driver> Driver for Restartable<D>
where
    D::Source: Capture,
{
    type Sink = D::Sink;
    type Source = D::Source;

    fn call(&self, sink: Option<Stream<D::Sink>>, name: &str) -> Result<D::Source> {
        let wrapper = &self.wrapper;
        let core = wrapper.core(name)?;

        let lane = next_lane();
        let recorder = Recorder::new(wrapper.history.clone());
        let source = core.source.capture(&recorder);

        let subscription = match sink {
            Some(sink) => {
                let weak = Rc::downgrade(wrapper);
                let core = core.clone();
                sink.subscribe(move |value| {
                    if core.active.get() != Some(lane) {
                        return;
                    }
                    if let Some(wrapper) = weak.upgrade() {
                        wrapper.forward(&core, value);
                    }
                })
            }
            None => Subscription::empty(),
        };

        // Called outside `run`: nobody will commit, so go live right away
        let wiring = current_graph();
        let graph = wiring.unwrap_or_else(GraphId::next);
        wrapper.lanes.borrow_mut().push(Lane {
            id: lane,
            graph,
            recorder,
            subscription,
        });
        tracing::trace!(driver = %name, %graph, lane, "lane attached");

        if wiring.is_none() {
            self.activate(graph);
        }
        Ok(source)
    }

    fn as_replayable(&self) -> Option<&dyn Replayable> {
        Some(self)
    }
}

impl<D: Driver> Replayable for Restartable<D>
where
    D::Source: Capture,
{
    fn activate(&self, graph: GraphId) {
        let wrapper = &self.wrapper;
        let (lane, stale) = {
            let lanes = wrapper.lanes.borrow();
            let lane = lanes
                .iter()
                .rev()
                .find(|lane| lane.graph == graph)
                .map(|lane| (lane.id, lane.recorder.clone()));
            let stale: Vec<Recorder<EventOf<D>>> = lanes
                .iter()
                .filter(|lane| lane.graph != graph)
                .map(|lane| lane.recorder.clone())
                .collect();
            (lane, stale)
        };
        let Some((id, recorder)) = lane else {
            return;
        };

        // Only the live graph writes history, even if nobody releases the rest
        for old in stale {
            old.close();
        }

        if let Some(core) = wrapper.core.borrow().as_ref() {
            core.active.set(Some(id));
        }
        *wrapper.current.borrow_mut() = Some(recorder);
        tracing::debug!(%graph, lane = id, "lane activated");
    }

    fn release(&self, graph: GraphId) {
        let wrapper = &self.wrapper;
        let released: Vec<Lane<EventOf<D>>> = {
            let mut lanes = wrapper.lanes.borrow_mut();
            let (released, kept): (Vec<_>, Vec<_>) =
                lanes.drain(..).partition(|lane| lane.graph == graph);
            *lanes = kept;
            released
        };

        let core = wrapper.core.borrow().clone();
        for lane in released {
            lane.subscription.unsubscribe();
            lane.recorder.close();

            if let Some(core) = &core {
                if core.active.get() == Some(lane.id) {
                    core.active.set(None);
                }
            }

            let mut current = wrapper.current.borrow_mut();
            if current.as_ref().is_some_and(|recorder| recorder.same(&lane.recorder)) {
                *current = None;
            }
            tracing::trace!(%graph, lane = lane.id, "lane released");
        }
    }

    fn begin_restart(&self) -> u64 {
        let wrapper = &self.wrapper;
        let epoch = wrapper.epoch.get() + 1;
        wrapper.epoch.set(epoch);
        if wrapper.config.pause_sinks_while_replaying {
            wrapper.held.borrow_mut().start();
        }
        epoch
    }

    fn epoch(&self) -> u64 {
        self.wrapper.epoch.get()
    }

    fn replay_plan(&self, until: Option<Sequence>) -> Vec<ReplayStep> {
        let Some(recorder) = self.wrapper.current.borrow().clone() else {
            return Vec::new();
        };

        self.wrapper
            .history
            .until(until)
            .into_iter()
            .map(|entry| {
                let recorder = recorder.clone();
                ReplayStep {
                    seq: entry.seq,
                    fire: Box::new(move || {
                        recorder.replay(&entry.key, entry.event);
                    }),
                }
            })
            .collect()
    }

    fn finish_replay(&self, epoch: u64) {
        let wrapper = &self.wrapper;
        if epoch != wrapper.epoch.get() {
            return;
        }

        let held = wrapper.held.borrow_mut().drain();
        let core = wrapper.core.borrow().clone();
        if let Some(core) = core {
            tracing::debug!(values = held.len(), "releasing held sink values");
            for value in held {
                core.outlet.send(value);
            }
        }
    }
}

impl<D: Driver> fmt::Debug for Restartable<D>
where
    D::Source: Capture,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Restartable")
            .field("config", &self.wrapper.config)
            .field("started", &self.is_started())
            .field("lanes", &self.lane_count())
            .field("history", &self.history_len())
            .field("epoch", &self.wrapper.epoch.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runtime::driver_fn;
    use crate::runtime::graph::within;

    /// Driver whose source is a subject and whose sink lands in `painted`.
    struct Loopback {
        calls: Rc<Cell<usize>>,
        painted: Rc<RefCell<Vec<i32>>>,
        input: Subject<i32>,
    }

    impl Loopback {
        fn new() -> Self {
            Self {
                calls: Rc::new(Cell::new(0)),
                painted: Rc::new(RefCell::new(Vec::new())),
                input: Subject::new(),
            }
        }
    }

    impl Driver for Loopback {
        type Sink = i32;
        type Source = Stream<i32>;

        fn call(&self, sink: Option<Stream<i32>>, _name: &str) -> Result<Stream<i32>> {
            self.calls.set(self.calls.get() + 1);
            if let Some(sink) = sink {
                let painted = self.painted.clone();
                sink.subscribe(move |v| painted.borrow_mut().push(v));
            }
            Ok(self.input.stream())
        }
    }

    fn sink_of(values: &Subject<i32>) -> Option<Stream<i32>> {
        Some(values.stream())
    }

    #[test]
    fn test_real_driver_called_once() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::default());

        for _ in 0..3 {
            within(GraphId::next(), || wrapped.call(None, "loopback").unwrap());
        }
        assert_eq!(loopback.calls.get(), 1);
        assert_eq!(wrapped.lane_count(), 3);
    }

    #[test]
    fn test_only_active_lane_reaches_driver() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::default());
        let old_sink = Subject::new();
        let new_sink = Subject::new();

        let g1 = GraphId::next();
        within(g1, || wrapped.call(sink_of(&old_sink), "loopback").unwrap());
        wrapped.activate(g1);
        old_sink.send(1);

        let g2 = GraphId::next();
        within(g2, || wrapped.call(sink_of(&new_sink), "loopback").unwrap());
        // Wired but not committed: old graph still drives
        old_sink.send(2);
        new_sink.send(100);

        wrapped.activate(g2);
        old_sink.send(3);
        new_sink.send(200);

        assert_eq!(*loopback.painted.borrow(), vec![1, 2, 200]);
        assert_eq!(wrapped.active_graph(), Some(g2));

        wrapped.release(g1);
        wrapped.release(g1);
        assert_eq!(wrapped.lane_count(), 1);
        assert_eq!(old_sink.listener_count(), 0);
        assert_eq!(wrapped.active_graph(), Some(g2));
    }

    #[test]
    fn test_call_outside_run_goes_live() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::default());
        let sink = Subject::new();

        let source = wrapped.call(sink_of(&sink), "loopback").unwrap();
        sink.send(5);
        assert_eq!(*loopback.painted.borrow(), vec![5]);

        // Source is usable and recorded
        let _sub = source.subscribe(|_| {});
        loopback.input.send(1);
        assert_eq!(wrapped.history_len(), 1);
    }

    #[test]
    fn test_null_sink_still_gives_source() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::default());

        let source = wrapped.call(None, "loopback").unwrap();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        let _sub = source.subscribe(move |v| seen_clone.set(v));
        loopback.input.send(42);
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn test_same_driver_wrapped_twice_starts_once() {
        let loopback = Rc::new(Loopback::new());
        let first = restartable(loopback.clone(), RestartConfig::default());
        let second = restartable(loopback.clone(), RestartConfig::new().pause_sinks_while_replaying(false));

        first.call(None, "a").unwrap();
        second.call(None, "b").unwrap();

        assert_eq!(loopback.calls.get(), 1);
        assert!(first.is_started() && second.is_started());
        assert!(!second.config().pause_sinks_while_replaying);
    }

    #[test]
    fn test_failing_driver_is_not_kept() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();
        let flaky = driver_fn(move |_: Option<Stream<()>>, name: &str| {
            attempts_clone.set(attempts_clone.get() + 1);
            if attempts_clone.get() == 1 {
                Err(Error::driver(name, "not ready"))
            } else {
                Ok(())
            }
        });
        let wrapped = restartable(Rc::new(flaky), RestartConfig::default());

        assert_eq!(wrapped.call(None, "flaky").unwrap_err(), Error::driver("flaky", "not ready"));
        assert!(!wrapped.is_started());
        assert_eq!(wrapped.lane_count(), 0);

        assert!(wrapped.call(None, "flaky").is_ok());
        assert!(wrapped.is_started());
    }

    #[test]
    fn test_dropped_cores_leave_registry() {
        let first = Rc::new(Loopback::new());
        let key = driver_key(&first);
        let wrapped = restartable(first.clone(), RestartConfig::default());
        wrapped.call(None, "first").unwrap();
        drop(wrapped);

        let second = restartable(Rc::new(Loopback::new()), RestartConfig::default());
        second.call(None, "second").unwrap();

        let registered = CORES.with(|cores| cores.borrow().contains_key(&key));
        assert!(!registered);
        assert_eq!(CORES.with(|cores| cores.borrow().len()), 1);
    }

    #[test]
    fn test_activation_stops_other_graphs_recording() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::default());

        let g1 = GraphId::next();
        let old = within(g1, || wrapped.call(None, "loopback").unwrap());
        wrapped.activate(g1);
        let _old_sub = old.subscribe(|_| {});

        let g2 = GraphId::next();
        let new = within(g2, || wrapped.call(None, "loopback").unwrap());
        let _new_sub = new.subscribe(|_| {});
        wrapped.activate(g2);

        // g1 is never released, yet only g2 logs
        loopback.input.send(1);
        assert_eq!(wrapped.history_len(), 1);
        assert_eq!(wrapped.lane_count(), 2);
    }

    #[test]
    fn test_held_values_released_in_order() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::default());
        let sink = Subject::new();
        wrapped.call(sink_of(&sink), "loopback").unwrap();

        let epoch = wrapped.begin_restart();
        sink.send(1);
        sink.send(2);
        assert!(loopback.painted.borrow().is_empty());
        assert_eq!(wrapped.held_len(), 2);

        // A stale epoch does nothing
        wrapped.finish_replay(epoch - 1);
        assert!(wrapped.is_holding());

        wrapped.finish_replay(epoch);
        assert_eq!(*loopback.painted.borrow(), vec![1, 2]);
        assert!(!wrapped.is_holding());

        sink.send(3);
        assert_eq!(*loopback.painted.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_no_pause_forwards_immediately() {
        let loopback = Rc::new(Loopback::new());
        let wrapped = restartable(loopback.clone(), RestartConfig::new().pause_sinks_while_replaying(false));
        let sink = Subject::new();
        wrapped.call(sink_of(&sink), "loopback").unwrap();

        wrapped.begin_restart();
        sink.send(1);
        assert_eq!(*loopback.painted.borrow(), vec![1]);
        assert_eq!(wrapped.held_len(), 0);
    }
}
