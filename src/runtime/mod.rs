//! Runtime - wiring `main` to drivers.
//!
//! ```text
//! main(sources) → sinks ──► sink proxies ──► drivers ──► sources ──► main
//! ```
//!
//! - [`driver`] - the `Driver` trait and the named driver set
//! - [`graph`] - graph ids and the wiring context drivers can query
//! - [`sources`] - `Sources`, `Sinks` and the live `Handle`
//! - [`run`](mod@run) - two-phase wiring (wire, then commit)

pub mod driver;
pub mod graph;
pub mod run;
pub mod sources;

pub use driver::{driver_fn, Driver, Drivers, FnDriver};
pub use graph::{current_graph, GraphId};
pub use run::run;
pub use sources::{Handle, Sinks, Sources};
