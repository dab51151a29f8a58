//! Restart - hot-swap an app's graph while its drivers keep running.
//!
//! Wrap drivers with [`restartable`], run the app, and when `main` changes
//! call [`restart`] with the new `main`, the same drivers and the old handle:
//!
//! - the real drivers are not called again (one mounted DOM root, one socket),
//! - the old graph's subscriptions are torn down after the new graph is live,
//! - recorded source events are replayed into the new graph so its state
//!   catches up with what the user already did.
//!
//! # Example
//!
//! ```ignore
//! let dom = restartable(Rc::new(make_dom_driver(&document, ".app")), RestartConfig::default());
//! let drivers = Drivers::new().with("DOM", dom);
//!
//! let handle = run(main, &drivers)?;
//! // ... main edited ...
//! let handle = restart(new_main, &drivers, &handle)?;
//! scheduler::flush();
//! ```

mod capture;
mod controller;
mod replay;
mod restartable;

pub use capture::{latest_sequence, Capture, EventLog, LogEntry, Recorder, Sequence};
pub use controller::{restart, restart_with, RestartOptions, Rerunner};
pub use replay::{ReplayBuffer, ReplayStep, Replayable};
pub use restartable::{restartable, EventOf, RestartConfig, Restartable};
