//! Document - headless containers that render virtual trees.
//!
//! A [`Container`] keeps the latest patched tree in a signal and paints it
//! through one render effect, the way a mounted app has exactly one render
//! loop. Tests and apps read what was painted (`text`, `find`) and poke it
//! (`click`), which bubbles to listeners registered by `DomSource`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use spark_signals::{effect, signal, Signal};

use crate::stream::Subscription;

use super::vnode::{scope_matches, Selector, VNode};

// =============================================================================
// Events
// =============================================================================

/// An event delivered to DOM listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomEvent {
    /// Event type (`"click"`).
    pub kind: String,
    /// Node the event was dispatched on.
    pub target: VNode,
}

type Handler = Rc<dyn Fn(DomEvent)>;

struct DomListener {
    id: usize,
    kind: String,
    scope: Vec<Selector>,
    handler: Handler,
}

// =============================================================================
// Container
// =============================================================================

struct ContainerInner {
    selector: String,
    tree: Signal<Option<VNode>>,
    screen: Rc<RefCell<Option<VNode>>>,
    paints: Rc<Cell<usize>>,
    mounts: Cell<usize>,
    stop_render: RefCell<Option<Box<dyn FnOnce()>>>,
    listeners: RefCell<Vec<DomListener>>,
    next_listener: Cell<usize>,
}

/// Mount point for one app.
#[derive(Clone)]
pub struct Container {
    inner: Rc<ContainerInner>,
}

impl Container {
    fn new(selector: &str) -> Self {
        Self {
            inner: Rc::new(ContainerInner {
                selector: selector.to_string(),
                tree: signal(None),
                screen: Rc::new(RefCell::new(None)),
                paints: Rc::new(Cell::new(0)),
                mounts: Cell::new(0),
                stop_render: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn selector(&self) -> &str {
        &self.inner.selector
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start the render effect. Mounting again restarts it and counts as a
    /// new mount.
    pub fn mount(&self) {
        self.stop_render();
        self.inner.mounts.set(self.inner.mounts.get() + 1);

        let tree = self.inner.tree.clone();
        let screen = self.inner.screen.clone();
        let paints = self.inner.paints.clone();
        let stop = effect(move || {
            let next = tree.get();
            *screen.borrow_mut() = next;
            paints.set(paints.get() + 1);
        });
        *self.inner.stop_render.borrow_mut() = Some(Box::new(stop));
        tracing::debug!(container = %self.inner.selector, mounts = self.inner.mounts.get(), "container mounted");
    }

    /// Stop rendering and clear the screen. Idempotent.
    pub fn unmount(&self) {
        if self.stop_render() {
            self.inner.tree.set(None);
            *self.inner.screen.borrow_mut() = None;
            tracing::debug!(container = %self.inner.selector, "container unmounted");
        }
    }

    fn stop_render(&self) -> bool {
        let stop = self.inner.stop_render.borrow_mut().take();
        match stop {
            Some(stop) => {
                stop();
                true
            }
            None => false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.stop_render.borrow().is_some()
    }

    /// How many times the container has been mounted.
    pub fn mount_count(&self) -> usize {
        self.inner.mounts.get()
    }

    /// How many times the render effect painted.
    pub fn paint_count(&self) -> usize {
        self.inner.paints.get()
    }

    /// Replace the tree. Painted right away when mounted.
    pub fn patch(&self, node: VNode) {
        self.inner.tree.set(Some(node));
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Painted tree, if any.
    pub fn tree(&self) -> Option<VNode> {
        self.inner.screen.borrow().clone()
    }

    /// First painted node matching `selector`.
    pub fn find(&self, selector: &str) -> Option<VNode> {
        let selector = Selector::parse(selector);
        let screen = self.inner.screen.borrow();
        let root = screen.as_ref()?;
        let found = root.find_all(&selector).first().map(|node| (*node).clone());
        found
    }

    /// Text of every painted node matching `selector`, concatenated.
    pub fn text(&self, selector: &str) -> String {
        let selector = Selector::parse(selector);
        let screen = self.inner.screen.borrow();
        let text = match screen.as_ref() {
            Some(root) => root
                .find_all(&selector)
                .iter()
                .map(|node| node.text_content())
                .collect(),
            None => String::new(),
        };
        text
    }

    /// Painted markup.
    pub fn html(&self) -> String {
        self.tree().map(|node| node.to_string()).unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Listen for `kind` events on nodes inside `scope`.
    pub fn on<F>(&self, kind: &str, scope: Vec<Selector>, handler: F) -> Subscription
    where
        F: Fn(DomEvent) + 'static,
    {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push(DomListener {
            id,
            kind: kind.to_string(),
            scope,
            handler: Rc::new(handler),
        });

        let inner = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.borrow_mut().retain(|listener| listener.id != id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Dispatch `kind` on the first painted node matching `selector`.
    ///
    /// The event bubbles: every listener whose scope covers the target or
    /// one of its ancestors is called. Returns false if nothing matched.
    pub fn dispatch(&self, kind: &str, selector: &str) -> bool {
        let selector = Selector::parse(selector);
        let (target, handlers) = {
            let screen = self.inner.screen.borrow();
            let Some(path) = screen.as_ref().and_then(|root| root.path_to(&selector)) else {
                return false;
            };
            let handlers: Vec<Handler> = self
                .inner
                .listeners
                .borrow()
                .iter()
                .filter(|listener| listener.kind == kind && scope_matches(&listener.scope, &path))
                .map(|listener| listener.handler.clone())
                .collect();
            let target = path.last().map(|node| (*node).clone()).unwrap_or_default();
            (target, handlers)
        };

        // Handlers may patch the tree, so the screen borrow is gone by now
        let event = DomEvent {
            kind: kind.to_string(),
            target,
        };
        for handler in handlers {
            handler(event.clone());
        }
        true
    }

    /// Click the first painted node matching `selector`.
    pub fn click(&self, selector: &str) -> bool {
        self.dispatch("click", selector)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("selector", &self.inner.selector)
            .field("mounted", &self.is_mounted())
            .field("mounts", &self.inner.mounts.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// =============================================================================
// Document
// =============================================================================

/// Set of containers drivers can mount into. Clones share the containers.
#[derive(Clone, Default)]
pub struct Document {
    containers: Rc<RefCell<Vec<Container>>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container addressed by `selector` (e.g. `".app"`).
    pub fn create_container(&self, selector: &str) -> Container {
        let container = Container::new(selector.trim());
        self.containers.borrow_mut().push(container.clone());
        container
    }

    /// Container registered under `selector`.
    pub fn query(&self, selector: &str) -> Option<Container> {
        let selector = selector.trim();
        self.containers
            .borrow()
            .iter()
            .find(|container| container.selector() == selector)
            .cloned()
    }

    /// Remove the container under `selector`, unmounting it.
    pub fn remove(&self, selector: &str) -> Option<Container> {
        let selector = selector.trim();
        let mut containers = self.containers.borrow_mut();
        let index = containers.iter().position(|c| c.selector() == selector)?;
        let container = containers.remove(index);
        drop(containers);
        container.unmount();
        Some(container)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.containers.borrow().iter()).finish()
    }
}
