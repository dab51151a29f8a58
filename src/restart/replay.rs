//! Replay Buffer and the restart hooks drivers expose.

use std::fmt;

use crate::runtime::GraphId;

use super::capture::Sequence;

// =============================================================================
// Replay Buffer
// =============================================================================

/// Ordered holding area for values produced during a restart window.
///
/// Values recorded between `start()` and `drain()` come back out in the order
/// they went in. `drain()` also closes the window.
pub struct ReplayBuffer<T> {
    values: Vec<T>,
    recording: bool,
}

impl<T> Default for ReplayBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReplayBuffer<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            recording: false,
        }
    }

    /// Open the window. Values already held are kept.
    pub fn start(&mut self) {
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Append a value.
    pub fn record(&mut self, value: T) {
        self.values.push(value);
    }

    /// Close the window and hand back everything recorded, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.recording = false;
        std::mem::take(&mut self.values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T> fmt::Debug for ReplayBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayBuffer")
            .field("len", &self.values.len())
            .field("recording", &self.recording)
            .finish()
    }
}

// =============================================================================
// Restart Hooks
// =============================================================================

/// One recorded event, ready to be pushed into the active graph.
pub struct ReplayStep {
    pub seq: Sequence,
    pub fire: Box<dyn FnOnce()>,
}

impl fmt::Debug for ReplayStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayStep").field("seq", &self.seq).finish()
    }
}

/// Hooks the runtime and the restart controller drive on restartable drivers.
pub trait Replayable {
    /// Make `graph` the one whose sinks reach the real driver.
    fn activate(&self, graph: GraphId);

    /// Detach everything this driver set up for `graph`. Idempotent.
    fn release(&self, graph: GraphId);

    /// A restart is starting. Returns the new restart epoch.
    fn begin_restart(&self) -> u64;

    /// Current restart epoch.
    fn epoch(&self) -> u64;

    /// Recorded events up to `until` (inclusive), bound to the active graph.
    fn replay_plan(&self, until: Option<Sequence>) -> Vec<ReplayStep>;

    /// Replay for `epoch` is done: release held sink values in order.
    /// Ignored when a newer restart has begun since.
    fn finish_replay(&self, epoch: u64);
}
