//! Restart - swap a running graph for a new one over the same drivers.
//!
//! ```text
//! restart(new_main, drivers, &old)
//!   1. wire new_main              (fails here → old graph untouched)
//!   2. begin_restart + commit     (replay window opens, new lanes go live)
//!   3. old.dispose()              (old lanes and sinks detach)
//!   4. schedule replay            (history up to the restart → new graph,
//!                                  then held values → driver)
//! ```
//!
//! Step 4 runs on the next [`flush`](crate::stream::scheduler::flush), so the
//! returned handle is live immediately but fully replayed only after a flush.

use std::rc::Rc;

use crate::error::Result;
use crate::runtime::driver::AnyDriver;
use crate::runtime::run::wire;
use crate::runtime::{run, Drivers, GraphId, Handle, Sinks, Sources};
use crate::stream::scheduler;

use super::capture::{latest_sequence, Sequence};

/// Extra knobs for [`restart_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestartOptions {
    /// Replay only events with `seq <= replay_until`. `None` replays all of
    /// them. Events recorded after the restart call are never replayed.
    pub replay_until: Option<Sequence>,
}

impl RestartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replay_until(mut self, seq: Sequence) -> Self {
        self.replay_until = Some(seq);
        self
    }
}

/// Restart with `new_main` against the same `drivers`, replaying everything.
///
/// On error nothing changed: the graph behind `handle` is still live.
pub fn restart<M>(new_main: M, drivers: &Drivers, handle: &Handle) -> Result<Handle>
where
    M: Fn(&Sources) -> Result<Sinks>,
{
    restart_with(new_main, drivers, handle, RestartOptions::default())
}

/// [`restart`] with options.
pub fn restart_with<M>(
    new_main: M,
    drivers: &Drivers,
    handle: &Handle,
    options: RestartOptions,
) -> Result<Handle>
where
    M: Fn(&Sources) -> Result<Sinks>,
{
    let previous = handle.graph();
    let wiring = wire(&new_main, drivers)?;
    let graph = wiring.graph();

    let targets: Vec<Target> = drivers
        .replayable()
        .into_iter()
        .filter_map(|(name, driver)| {
            let epoch = driver.replayable()?.begin_restart();
            Some(Target {
                name,
                driver,
                epoch,
            })
        })
        .collect();

    // Events after this point reach the new graph live, so replay stops here
    let cutoff = latest_sequence();
    let until = options.replay_until.map_or(cutoff, |limit| limit.min(cutoff));

    let fresh = wiring.commit();
    handle.dispose();

    tracing::debug!(
        from = ?previous,
        to = %graph,
        drivers = targets.len(),
        "graph restarted"
    );

    scheduler::schedule(move || replay(graph, &targets, until));
    Ok(fresh)
}

struct Target {
    name: String,
    driver: Rc<dyn AnyDriver>,
    epoch: u64,
}

fn replay(graph: GraphId, targets: &[Target], until: Sequence) {
    let mut steps = Vec::new();
    for target in targets {
        let Some(replayable) = target.driver.replayable() else {
            continue;
        };
        if replayable.epoch() != target.epoch {
            tracing::trace!(%graph, driver = %target.name, "replay superseded");
            continue;
        }
        steps.extend(replayable.replay_plan(Some(until)));
    }

    steps.sort_by_key(|step| step.seq);
    let events = steps.len();
    for step in steps {
        (step.fire)();
    }

    for target in targets {
        if let Some(replayable) = target.driver.replayable() {
            replayable.finish_replay(target.epoch);
        }
    }

    tracing::debug!(%graph, events, until, "replay finished");
}

// =============================================================================
// Rerunner
// =============================================================================

/// Keeps the drivers and the live handle of an app that gets re-run.
///
/// The first [`rerun`](Rerunner::rerun) runs `main`; every later one restarts
/// into the new `main`.
#[derive(Debug)]
pub struct Rerunner {
    drivers: Drivers,
    handle: Option<Handle>,
    options: RestartOptions,
}

impl Rerunner {
    pub fn new(drivers: Drivers) -> Self {
        Self {
            drivers,
            handle: None,
            options: RestartOptions::default(),
        }
    }

    /// Options applied to every restart.
    pub fn with_options(mut self, options: RestartOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rerun<M>(&mut self, main: M) -> Result<&Handle>
    where
        M: Fn(&Sources) -> Result<Sinks>,
    {
        let next = match &self.handle {
            None => run(main, &self.drivers)?,
            Some(handle) => restart_with(main, &self.drivers, handle, self.options)?,
        };
        Ok(&*self.handle.insert(next))
    }

    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }

    pub fn drivers(&self) -> &Drivers {
        &self.drivers
    }

    /// Dispose the running graph. The next `rerun` starts from scratch.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.dispose();
        }
    }
}
