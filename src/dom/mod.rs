//! Headless DOM - a virtual document the DOM driver renders into.
//!
//! - [`vnode`] - `VNode`, selectors and the `h`/`div`/`button`/`span` builders
//! - [`document`] - `Document`, `Container` (render effect, queries, clicks)
//! - [`driver`] - `make_dom_driver` and the `DomSource` handed to `main`
//!
//! # Example
//!
//! ```
//! use spark_restart::dom::{button, div, make_dom_driver, span, Document, DomSource};
//! use spark_restart::runtime::{run, Drivers, Sinks, Sources};
//!
//! let document = Document::new();
//! let app = document.create_container(".app");
//! let drivers = Drivers::new().with("DOM", make_dom_driver(&document, ".app"));
//!
//! let handle = run(
//!     |sources: &Sources| {
//!         let clicks = sources.get::<DomSource>("DOM")?.select(".add").events("click");
//!         let view = clicks
//!             .map_to(1)
//!             .scan(0, |total, n| total + n)
//!             .start_with(0)
//!             .map(|n| div(".app", vec![button(".add", "+"), span(".count", n.to_string())]));
//!         Ok(Sinks::new().with("DOM", view))
//!     },
//!     &drivers,
//! )
//! .unwrap();
//!
//! app.click(".add");
//! assert_eq!(app.text(".count"), "1");
//! handle.dispose();
//! ```

pub mod document;
pub mod driver;
pub mod vnode;

pub use document::{Container, Document, DomEvent};
pub use driver::{make_dom_driver, DomDriver, DomSource};
pub use vnode::{button, div, h, span, Content, Selector, VNode};
