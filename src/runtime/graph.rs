//! Graph identity and the wiring context.
//!
//! Every call to `run` builds one graph. Drivers invoked while that graph is
//! being wired can ask which graph they belong to through [`current_graph`],
//! the same way primitives ask for their parent during creation.

use std::cell::{Cell, RefCell};
use std::fmt;

/// Identifier of one wired graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(pub u64);

impl GraphId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        NEXT_GRAPH.with(|next| {
            let id = next.get();
            next.set(id + 1);
            GraphId(id)
        })
    }
}

impl fmt::Debug for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphId({})", self.0)
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

thread_local! {
    static NEXT_GRAPH: Cell<u64> = const { Cell::new(0) };

    /// Graphs currently being wired (innermost last).
    static WIRING_STACK: RefCell<Vec<GraphId>> = const { RefCell::new(Vec::new()) };
}

/// Graph currently being wired, if any.
pub fn current_graph() -> Option<GraphId> {
    WIRING_STACK.with(|stack| stack.borrow().last().copied())
}

/// Run `f` with `graph` as the current wiring context.
pub fn within<R>(graph: GraphId, f: impl FnOnce() -> R) -> R {
    WIRING_STACK.with(|stack| stack.borrow_mut().push(graph));
    let result = f();
    WIRING_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
    result
}
