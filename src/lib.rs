//! # spark-restart
//!
//! Hot-restartable reactive dataflow runtime for Rust.
//!
//! An app is a `main` function from driver sources to sink streams. Drivers
//! own the outside world (a DOM container, a socket). `spark-restart` lets you
//! swap `main` while the app runs: the drivers stay up, the old graph is torn
//! down, and what the user already did is replayed into the new graph.
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────── restartable driver ────────────┐
//! main(sources)│ lane g1 (old, inactive)                    │
//!   → sinks ──►│ lane g2 (active) ──► [replay buffer] ──► outlet ──► real driver
//!              │                                            │
//!   sources ◄──│ recorder g2 ◄── real source  (history) ────┘
//! ```
//!
//! Rendering effects run on [spark-signals](https://github.com/RLabs-Inc/spark-signals).
//!
//! ## Modules
//!
//! - [`stream`] - synchronous push streams and the explicit scheduler
//! - [`runtime`] - drivers, sources/sinks, `run`
//! - [`restart`] - `restartable`, `restart`, replay and event capture
//! - [`dom`] - headless DOM driver used by apps and tests
//! - [`error`] - crate error type

pub mod dom;
pub mod error;
pub mod restart;
pub mod runtime;
pub mod stream;

// Re-export commonly used items
pub use error::{Error, Result};

pub use runtime::{driver_fn, run, Driver, Drivers, GraphId, Handle, Sinks, Sources};

pub use restart::{
    restart, restart_with, restartable, RestartConfig, RestartOptions, Restartable, Rerunner,
};

pub use stream::scheduler::flush;
pub use stream::{Stream, Subject, Subscription};
